// ABOUTME: Connection configuration for the SQL Server change source
// ABOUTME: Loaded from TOML, overridable from CLI flags and environment

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Settings needed to reach a CDC-enabled SQL Server database.
///
/// Either `connection_string` (ADO.NET syntax) or the discrete host/database
/// fields are used; a connection string wins when both are present. A
/// connection string carries its own credentials, so `password` must be unset
/// alongside it.
///
/// The `Debug` implementation redacts the password and connection string.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// ADO.NET style connection string, e.g.
    /// `server=tcp:localhost,1433;database=shop;user=sa;password=...`
    pub connection_string: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Option<String>,
    pub application_name: String,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
    /// Upper bound for each individual round trip
    pub command_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            host: "localhost".to_string(),
            port: 1433,
            database: String::new(),
            username: String::new(),
            password: None,
            application_name: "cdc-changeset".to_string(),
            encrypt: true,
            trust_server_certificate: false,
            command_timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "[REDACTED]"),
            )
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("application_name", &self.application_name)
            .field("encrypt", &self.encrypt)
            .field("trust_server_certificate", &self.trust_server_certificate)
            .field("command_timeout_secs", &self.command_timeout_secs)
            .finish()
    }
}

impl ConnectionConfig {
    /// Build a config around an ADO.NET connection string.
    pub fn from_connection_string(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: Some(connection_string.into()),
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read connection config from {:?}", path))?;
        let config: ConnectionConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse connection config from {:?}", path))?;
        Ok(config)
    }

    /// Default config file looked up in the working directory
    pub fn default_path() -> PathBuf {
        PathBuf::from("cdc-changeset.toml")
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Check that the config can be used to open a connection.
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            bail!("command_timeout_secs must be greater than zero");
        }

        if let Some(connection_string) = &self.connection_string {
            if connection_string.trim().is_empty() {
                bail!("connection_string is set but empty");
            }
            if self.password.is_some() {
                bail!(
                    "password cannot be combined with connection_string; \
                     put it in the connection string"
                );
            }
            return Ok(());
        }

        if self.host.trim().is_empty() {
            bail!("host is required");
        }
        if self.database.trim().is_empty() {
            bail!("database is required (CDC is enabled per database)");
        }
        if self.username.trim().is_empty() {
            bail!("username is required for SQL Server authentication");
        }
        if self.password.is_none() {
            bail!("password is required for SQL Server authentication");
        }
        Ok(())
    }
}
