//! Status command - reports the persisted `SyncState` high-water marks and
//! the most recently completed `SyncResult` for the demo account.

use anyhow::Result;
use clap::Args;
use evercore_sync::{LastSyncStatusStore, SyncStateStore};

use super::support::{data_dir, load_config, DEMO_USER_ID};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand;

impl StatusCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        let config = load_config();
        let dir = data_dir(&config);

        let sync_state_store = SyncStateStore::new(&dir);
        let state = sync_state_store.get_sync_state(DEMO_USER_ID).await?;

        let last_sync_status_store = LastSyncStatusStore::new(&dir);
        let last_result = last_sync_status_store.read(DEMO_USER_ID).await?;

        if matches!(format, OutputFormat::Json) {
            fmt.print_json(&serde_json::json!({
                "user_data_update_count": state.user_data_update_count.value(),
                "user_data_last_sync_time": state.user_data_last_sync_time.map(|t| t.as_millis()),
                "linked_notebooks_tracked": state.linked_notebook_update_counts.len(),
                "last_sync_result": last_result,
            }));
            return Ok(());
        }

        fmt.success("Sync state");
        fmt.info(&format!("User data update count: {}", state.user_data_update_count));
        match state.user_data_last_sync_time {
            Some(t) => fmt.info(&format!("Last sync time: {t}")),
            None => fmt.info("Last sync time: never"),
        }
        fmt.info(&format!("Linked notebooks tracked: {}", state.linked_notebook_update_counts.len()));

        match last_result {
            Some(result) => {
                fmt.info("");
                fmt.info("Last completed round:");
                fmt.info(&format!(
                    "  Notebooks: {}  Notes: {}",
                    result.user_account_sync_chunks_data_counters.total_notebooks,
                    result.user_account_sync_chunks_data_counters.total_notes
                ));
                fmt.info(&format!(
                    "  Notes sent: {}  Failed to send: {}",
                    result.user_account_send_status.total_successfully_sent_notes,
                    result.user_account_send_status.failed_to_send_notes.len()
                ));
                if let Some(err) = result.stop_synchronization_error {
                    fmt.warn(&format!("  Stopped early: {err:?}"));
                }
            }
            None => fmt.info("No completed sync round yet. Run 'evercore sync'."),
        }

        Ok(())
    }
}
