//! Auth commands - authenticate the demo account, inspect token status, and
//! revoke cached/persisted credentials.

use anyhow::Result;
use clap::Subcommand;
use evercore_sync::AuthOptions;

use super::support::{build_auth_provider, load_config, DEMO_USER_ID};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Authenticate the demo account and cache the resulting token
    Login,
    /// Revoke cached and persisted credentials
    Logout,
    /// Check authentication status
    Status,
}

impl AuthCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        let config = load_config();
        let provider = build_auth_provider(&config);

        match self {
            AuthCommand::Login => {
                let info = provider.authenticate_new_account().await?;
                fmt.success(&format!("Authenticated account {}", info.user_id));
                fmt.info(&format!("Shard: {}", info.shard_id));
                fmt.info(&format!("Token expires: {}", info.auth_token_expiration_time));
            }
            AuthCommand::Logout => {
                provider.revoke_authentication(DEMO_USER_ID).await?;
                fmt.success("Logged out");
                fmt.info("Credentials removed from cache and keychain");
            }
            AuthCommand::Status => {
                match provider.authenticate_account(DEMO_USER_ID, AuthOptions::UseCached).await {
                    Ok(info) => {
                        if matches!(format, OutputFormat::Json) {
                            fmt.print_json(&serde_json::json!({
                                "authenticated": true,
                                "user_id": info.user_id.value(),
                                "shard_id": info.shard_id,
                                "expires_at_millis": info.auth_token_expiration_time.as_millis(),
                            }));
                        } else {
                            fmt.success(&format!("Authenticated as account {}", info.user_id));
                            fmt.info(&format!("Shard: {}", info.shard_id));
                            fmt.info(&format!("Token expires: {}", info.auth_token_expiration_time));
                        }
                    }
                    Err(_) => {
                        if matches!(format, OutputFormat::Json) {
                            fmt.print_json(&serde_json::json!({"authenticated": false}));
                        } else {
                            fmt.info("Authentication status: Not configured");
                            fmt.info("Run 'evercore auth login' to authenticate");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
