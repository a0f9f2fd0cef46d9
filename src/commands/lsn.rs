// ABOUTME: `lsn` command - inspect and navigate log sequence numbers
// ABOUTME: Wraps the min/max, increment/decrement and time mapping functions

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Args, Subcommand};
use serde_json::json;

use super::{connect, print_json, ConnectionOverrides};
use crate::changes::{ChangeSource, Lsn, RelationalOperator};

#[derive(Args, Debug)]
pub struct LsnArgs {
    #[command(subcommand)]
    command: LsnCommands,
}

#[derive(Subcommand, Debug)]
enum LsnCommands {
    /// Highest LSN written by the capture process
    Max,
    /// Lowest LSN retained for a capture instance
    Min {
        #[arg(long)]
        capture_instance: String,
    },
    /// LSN following the given one
    Next {
        #[arg(long)]
        lsn: Lsn,
    },
    /// LSN preceding the given one
    Previous {
        #[arg(long)]
        lsn: Lsn,
    },
    /// Commit time of the transaction at an LSN
    Time {
        #[arg(long)]
        lsn: Lsn,
    },
    /// LSN matching a commit time
    FromTime {
        #[arg(long, value_enum)]
        operator: RelationalOperator,
        /// Local time, e.g. 2024-05-01T12:00:00
        #[arg(long, value_parser = parse_time)]
        time: NaiveDateTime,
    },
}

pub async fn lsn(args: LsnArgs, overrides: &ConnectionOverrides) -> Result<()> {
    let mut source = connect(overrides).await?;

    let output = match args.command {
        LsnCommands::Max => json!({ "lsn": source.get_max_lsn().await? }),
        LsnCommands::Min { capture_instance } => {
            json!({ "lsn": source.get_min_lsn(&capture_instance).await? })
        }
        LsnCommands::Next { lsn } => json!({ "lsn": source.increment_lsn(&lsn).await? }),
        LsnCommands::Previous { lsn } => json!({ "lsn": source.decrement_lsn(&lsn).await? }),
        LsnCommands::Time { lsn } => {
            let time = source
                .map_lsn_to_time(&lsn)
                .await?
                .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
            json!({ "lsn": lsn, "time": time })
        }
        LsnCommands::FromTime { operator, time } => {
            json!({ "lsn": source.map_time_to_lsn(operator, time).await? })
        }
    };

    print_json(&output, false)
}

fn parse_time(value: &str) -> Result<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .with_context(|| format!("'{}' is not a timestamp like 2024-05-01T12:00:00", value))
}
