//! Resumable per-account progress marker.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ids::{Guid, Timestamp, Usn};

/// Resumable progress marker for one account. Update counts only ever
/// increase; a missing linked-notebook entry means "never synced".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub user_data_update_count: Usn,
    pub user_data_last_sync_time: Option<Timestamp>,
    #[serde(default)]
    pub linked_notebook_update_counts: HashMap<Guid, Usn>,
    #[serde(default)]
    pub linked_notebook_last_sync_times: HashMap<Guid, Timestamp>,
}

impl SyncState {
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Advance `user_data_update_count`, refusing to move it backwards.
    pub fn advance_user_data(&mut self, usn: Usn, at: Timestamp) {
        if usn > self.user_data_update_count {
            self.user_data_update_count = usn;
        }
        self.user_data_last_sync_time = Some(at);
    }

    /// Advance the high-water mark for one linked notebook, refusing to move
    /// it backwards.
    pub fn advance_linked_notebook(&mut self, guid: Guid, usn: Usn, at: Timestamp) {
        let entry = self
            .linked_notebook_update_counts
            .entry(guid.clone())
            .or_insert(Usn::ZERO);
        if usn > *entry {
            *entry = usn;
        }
        self.linked_notebook_last_sync_times.insert(guid, at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_never_decreases() {
        let mut state = SyncState::zero();
        state.advance_user_data(Usn::new(10), Timestamp::from_millis(1));
        state.advance_user_data(Usn::new(5), Timestamp::from_millis(2));
        assert_eq!(state.user_data_update_count, Usn::new(10));
        assert_eq!(state.user_data_last_sync_time, Some(Timestamp::from_millis(2)));
    }

    #[test]
    fn missing_linked_notebook_means_never_synced() {
        let state = SyncState::zero();
        let guid = Guid::new("8a6b2f3e-1111-2222-3333-444455556666").unwrap();
        assert!(!state.linked_notebook_update_counts.contains_key(&guid));
    }

    #[test]
    fn serde_roundtrip() {
        let mut state = SyncState::zero();
        state.advance_user_data(Usn::new(42), Timestamp::from_millis(100));
        let json = serde_json::to_string(&state).unwrap();
        let back: SyncState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }
}
