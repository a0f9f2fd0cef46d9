// ABOUTME: CLI entry point for cdc-changeset
// ABOUTME: Parses commands and routes to appropriate handlers

use cdc_changeset::commands::{self, ConnectionOverrides};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cdc-changeset")]
#[command(about = "Read SQL Server CDC change sets with merged update pairs", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Path to a TOML connection config (defaults to ./cdc-changeset.toml when present)
    #[arg(long = "config", global = true)]
    config_path: Option<PathBuf>,
    /// ADO.NET connection string, overrides the config file
    #[arg(long, env = "CDC_MSSQL_CONNECTION", global = true, hide_env_values = true)]
    connection: Option<String>,
    /// SQL Server password, overrides the config file
    #[arg(long, env = "CDC_MSSQL_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,
    /// Per-query timeout in seconds
    #[arg(long = "command-timeout", global = true)]
    command_timeout: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the change set of a capture instance and print it as JSON
    Changes(commands::ChangesArgs),
    /// Resolve an update mask to the names of the changed columns
    ChangedColumns(commands::ChangedColumnsArgs),
    /// Inspect log sequence numbers
    Lsn(commands::LsnArgs),
    /// List capture instances grouped by source table
    CaptureInstances(commands::CaptureArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    // stdout carries the JSON output
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let overrides = ConnectionOverrides {
        config_path: cli.config_path,
        connection_string: cli.connection,
        password: cli.password,
        command_timeout_secs: cli.command_timeout,
    };

    match cli.command {
        Commands::Changes(args) => commands::changes(args, &overrides).await,
        Commands::ChangedColumns(args) => commands::changed_columns(args, &overrides).await,
        Commands::Lsn(args) => commands::lsn(args, &overrides).await,
        Commands::CaptureInstances(args) => commands::capture_instances(args, &overrides).await,
    }
}
