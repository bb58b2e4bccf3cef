//! Config command - view and edit the on-disk configuration (§ ambient
//! configuration layer).

use anyhow::{Context, Result};
use clap::Subcommand;
use evercore_core::config::{Config, DefaultConflictStrategy};

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.max_in_flight_downloads")
        key: String,
        /// New value
        value: String,
    },
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => Self::execute_show(format),
            ConfigCommand::Set { key, value } => Self::execute_set(key, value, format),
            ConfigCommand::Validate => Self::execute_validate(format),
        }
    }

    fn execute_show(format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format == OutputFormat::Json);
        let config = Config::load_or_default().unwrap_or_default();

        if matches!(format, OutputFormat::Json) {
            let json = serde_json::to_value(&config).context("serializing configuration")?;
            formatter.print_json(&json);
        } else {
            let path = Config::default_path().map(|p| p.display().to_string()).unwrap_or_else(|| "(none)".into());
            formatter.success(&format!("Configuration ({path})"));
            formatter.info("");
            let yaml = serde_yaml::to_string(&config).context("serializing configuration")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    fn execute_set(key: &str, value: &str, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format == OutputFormat::Json);
        let Some(path) = Config::default_path() else {
            formatter.error("no config directory available on this platform");
            return Ok(());
        };
        let mut config = Config::load_or_default().unwrap_or_default();

        match apply_config_value(&mut config, key, value) {
            Ok(()) => {
                let errors = config.validate();
                if !errors.is_empty() {
                    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                    formatter.error(&format!("Invalid value for '{key}': {}", messages.join("; ")));
                    return Ok(());
                }

                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).context("creating config directory")?;
                }
                let yaml = serde_yaml::to_string(&config).context("serializing configuration")?;
                std::fs::write(&path, yaml).context("writing configuration file")?;

                formatter.success(&format!("Set {key} = {value}"));
                formatter.info(&format!("Saved to {}", path.display()));
            }
            Err(err) => formatter.error(&format!("Failed to set '{key}': {err}")),
        }

        Ok(())
    }

    fn execute_validate(format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format == OutputFormat::Json);
        let Some(path) = Config::default_path() else {
            formatter.error("no config directory available on this platform");
            return Ok(());
        };

        if !path.exists() {
            formatter.info(&format!("Configuration file not found at {}", path.display()));
            formatter.info("Using default configuration. Run 'evercore config set <key> <value>' to create one.");
            return Ok(());
        }

        let config = match Config::load(&path) {
            Ok(config) => config,
            Err(err) => {
                formatter.error(&format!("Failed to parse configuration: {err}"));
                return Ok(());
            }
        };

        let errors = config.validate();
        if errors.is_empty() {
            formatter.success("Configuration is valid");
        } else {
            formatter.error(&format!("Configuration has {} error(s):", errors.len()));
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        Ok(())
    }
}

/// Supported keys: sync.max_entries_per_chunk, sync.max_in_flight_downloads,
/// sync.download_note_thumbnails, retry.base_delay_millis, retry.max_retries,
/// retry.exponential_backoff, conflicts.default_strategy, logging.level,
/// logging.json, auth.keychain_service, storage.data_dir.
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "sync.max_entries_per_chunk" => {
            config.sync.max_entries_per_chunk = value.parse().context("expected a positive integer")?;
        }
        "sync.max_in_flight_downloads" => {
            config.sync.max_in_flight_downloads = value.parse().context("expected a positive integer")?;
        }
        "sync.download_note_thumbnails" => {
            config.sync.download_note_thumbnails = value.parse().context("expected true or false")?;
        }
        "retry.base_delay_millis" => {
            config.retry.base_delay_millis = value.parse().context("expected a positive integer")?;
        }
        "retry.max_retries" => {
            config.retry.max_retries = value.parse().context("expected a positive integer")?;
        }
        "retry.exponential_backoff" => {
            config.retry.exponential_backoff = value.parse().context("expected true or false")?;
        }
        "conflicts.default_strategy" => {
            config.conflicts.default_strategy = match value {
                "use_theirs" => DefaultConflictStrategy::UseTheirs,
                "use_mine" => DefaultConflictStrategy::UseMine,
                "move_mine" => DefaultConflictStrategy::MoveMine,
                other => anyhow::bail!("unknown conflict strategy '{other}' (expected use_theirs|use_mine|move_mine)"),
            };
        }
        "logging.level" => config.logging.level = value.to_string(),
        "logging.json" => {
            config.logging.json = value.parse().context("expected true or false")?;
        }
        "auth.keychain_service" => config.auth.keychain_service = value.to_string(),
        "storage.data_dir" => config.storage.data_dir = value.into(),
        _ => anyhow::bail!("unknown configuration key: '{key}'"),
    }

    Ok(())
}
