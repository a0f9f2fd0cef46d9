// ABOUTME: CLI command implementations for querying change data
// ABOUTME: Shared connection resolution and JSON output helpers

pub mod capture;
pub mod changes;
pub mod columns;
pub mod lsn;

pub use capture::{capture_instances, CaptureArgs};
pub use changes::{changes, ChangesArgs};
pub use columns::{changed_columns, ChangedColumnsArgs};
pub use lsn::{lsn, LsnArgs};

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use crate::config::ConnectionConfig;
use crate::sqlserver::SqlServerSource;

/// Connection settings given on the command line or in the environment.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOverrides {
    pub config_path: Option<PathBuf>,
    pub connection_string: Option<String>,
    pub password: Option<String>,
    pub command_timeout_secs: Option<u64>,
}

impl ConnectionOverrides {
    /// Layer the overrides on top of a base configuration.
    pub fn apply(&self, mut config: ConnectionConfig) -> ConnectionConfig {
        if let Some(connection_string) = &self.connection_string {
            config.connection_string = Some(connection_string.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        if let Some(secs) = self.command_timeout_secs {
            config.command_timeout_secs = secs;
        }
        config
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit `--config` path must exist. Without one, the default file
    /// in the working directory is read when present.
    pub async fn resolve(&self) -> Result<ConnectionConfig> {
        let base = match &self.config_path {
            Some(path) => ConnectionConfig::load(path).await?,
            None => {
                let default_path = ConnectionConfig::default_path();
                if tokio::fs::try_exists(&default_path).await.unwrap_or(false) {
                    tracing::debug!("Using connection config from {:?}", default_path);
                    ConnectionConfig::load(&default_path).await?
                } else {
                    ConnectionConfig::default()
                }
            }
        };

        let config = self.apply(base);
        config.validate().context("Invalid connection configuration")?;
        Ok(config)
    }
}

pub(crate) async fn connect(overrides: &ConnectionOverrides) -> Result<SqlServerSource> {
    let config = overrides.resolve().await?;
    tracing::debug!("Resolved connection config: {:?}", config);
    SqlServerSource::connect(&config).await
}

pub(crate) fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("Failed to serialize output")?;
    println!("{}", output);
    Ok(())
}
