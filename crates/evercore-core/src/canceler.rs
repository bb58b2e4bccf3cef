//! A cooperative, thread-safe cancellation latch.
//!
//! Every long-running component consults `is_canceled()` at loop heads,
//! before remote calls, before local-storage writes, and inside sleeps.
//! `is_canceled()` is cheap, wait-free, and monotonic: once `true`, it stays
//! `true`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Thread-safe `isCanceled()` probe.
pub trait IsCanceled: Send + Sync {
    fn is_canceled(&self) -> bool;
}

/// User calls `cancel()`, which atomically stores `true`.
#[derive(Debug, Default)]
pub struct ManualCanceler {
    flag: AtomicBool,
}

impl ManualCanceler {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl IsCanceled for ManualCanceler {
    fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Delegates to a `tokio::sync::watch` channel's cancellation flag, the
/// idiomatic stand-in for "delegates to a future's cancellation flag".
pub struct FutureTrackingCanceler {
    receiver: tokio::sync::watch::Receiver<bool>,
}

impl FutureTrackingCanceler {
    #[must_use]
    pub fn new(receiver: tokio::sync::watch::Receiver<bool>) -> Self {
        Self { receiver }
    }
}

impl IsCanceled for FutureTrackingCanceler {
    fn is_canceled(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Returns `true` if any contained canceler reports `true`.
pub struct AnyOfCanceler {
    cancelers: Vec<Arc<dyn IsCanceled>>,
}

impl AnyOfCanceler {
    #[must_use]
    pub fn new(cancelers: Vec<Arc<dyn IsCanceled>>) -> Self {
        Self { cancelers }
    }
}

impl IsCanceled for AnyOfCanceler {
    fn is_canceled(&self) -> bool {
        self.cancelers.iter().any(|c| c.is_canceled())
    }
}

/// A type-erased handle used throughout the sync pipeline.
pub type Canceler = Arc<dyn IsCanceled>;
