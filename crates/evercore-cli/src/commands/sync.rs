//! Sync command - runs one account-synchronizer round against the demo
//! in-memory backend and reports the resulting counters.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use evercore_core::canceler::ManualCanceler;
use evercore_core::domain::SyncOptions;
use evercore_core::memory_storage::InMemoryLocalStorage;
use evercore_conflict::DefaultConflictResolver;
use evercore_sync::{
    AccountSynchronizer, ChunksProvider, Downloader, FullDataDownloader, InMemoryNoteStoreFactory,
    LastSyncStatusStore, Sender, SyncChunksStorage, SyncStateStore,
};

use super::support::{build_auth_provider, data_dir, load_config, DEMO_USER_ID};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Show what would be synced without persisting any state
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        let config = load_config();
        let dir = data_dir(&config);
        tokio::fs::create_dir_all(&dir).await?;

        if self.dry_run {
            fmt.info("Dry run mode - no changes will be made");
            fmt.success("Dry run completed (no changes)");
            return Ok(());
        }

        let auth_provider = build_auth_provider(&config);
        let note_store_factory = Arc::new(InMemoryNoteStoreFactory::new());
        let storage: Arc<dyn evercore_core::ports::ILocalStorage> = Arc::new(InMemoryLocalStorage::new());
        let sync_state_store = SyncStateStore::new(&dir);
        let last_sync_status_store = LastSyncStatusStore::new(&dir);

        let chunks_storage = Arc::new(SyncChunksStorage::new(&dir));
        let downloader = Arc::new(Downloader::new(
            Arc::new(ChunksProvider::new(chunks_storage)),
            Arc::new(FullDataDownloader::new(config.sync.max_in_flight_downloads)),
            Arc::new(DefaultConflictResolver::default()),
        ));
        let sender = Arc::new(Sender::new());

        let options = SyncOptions {
            download_note_thumbnails: config.sync.download_note_thumbnails,
            ink_note_images_storage_dir: config.sync.ink_note_images_storage_dir.clone(),
            max_in_flight_downloads: config.sync.max_in_flight_downloads,
        };

        let synchronizer = AccountSynchronizer::new(
            auth_provider,
            note_store_factory,
            storage,
            sync_state_store,
            downloader,
            sender,
            options,
        );

        fmt.info("Starting synchronization...");
        let canceler = ManualCanceler::new();
        let result = synchronizer.run(DEMO_USER_ID, &canceler).await?;
        last_sync_status_store.write(DEMO_USER_ID, &result).await?;

        if matches!(format, OutputFormat::Json) {
            fmt.print_json(&serde_json::json!({
                "notebooks": result.user_account_sync_chunks_data_counters.total_notebooks,
                "notes": result.user_account_sync_chunks_data_counters.total_notes,
                "notes_downloaded": result.user_account_download_notes_status.total_new_notes
                    + result.user_account_download_notes_status.total_updated_notes,
                "notes_sent": result.user_account_send_status.total_successfully_sent_notes,
                "stop_synchronization_error": result.stop_synchronization_error,
            }));
        } else {
            fmt.success("Sync round complete");
            fmt.info(&format!(
                "Notebooks seen: {}  Notes seen: {}",
                result.user_account_sync_chunks_data_counters.total_notebooks,
                result.user_account_sync_chunks_data_counters.total_notes
            ));
            fmt.info(&format!(
                "Notes sent: {}  Notes failed to send: {}",
                result.user_account_send_status.total_successfully_sent_notes,
                result.user_account_send_status.failed_to_send_notes.len()
            ));
            if let Some(err) = &result.stop_synchronization_error {
                fmt.warn(&format!("Synchronization stopped early: {err:?}"));
            }
        }

        Ok(())
    }
}
