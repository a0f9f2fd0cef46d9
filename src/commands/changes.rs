// ABOUTME: `changes` command - assemble and print a change set as JSON
// ABOUTME: Parses mode, row filter and starting LSN from the command line

use anyhow::{anyhow, Result};
use clap::{Args, ValueEnum};

use super::{connect, print_json, ConnectionOverrides};
use crate::changes::{
    AllChangesFilter, ChangeMode, ChangeSetAssembler, Lsn, NetChangesFilter, RowFilter,
};

#[derive(Args, Debug)]
pub struct ChangesArgs {
    /// Capture instance to read, e.g. dbo_Customers
    #[arg(long)]
    pub capture_instance: String,
    /// Every change (`all`) or the net change per key (`net`)
    #[arg(long, value_enum, default_value_t = ChangeMode::All)]
    pub mode: ChangeMode,
    /// Start of the window as hex (defaults to the minimum retained LSN)
    #[arg(long)]
    pub from_lsn: Option<Lsn>,
    /// Row filter, e.g. "all update old" or "all with merge"
    #[arg(long)]
    pub filter: Option<String>,
    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

pub async fn changes(args: ChangesArgs, overrides: &ConnectionOverrides) -> Result<()> {
    let filter = parse_row_filter(args.mode, args.filter.as_deref())?;
    let mut source = connect(overrides).await?;

    let change_set = ChangeSetAssembler::new(&mut source)
        .get_changes(&args.capture_instance, args.from_lsn.as_ref(), filter)
        .await?;

    print_json(&change_set, args.pretty)
}

/// Accepts the SQL spelling ("all update old") or the flag spelling
/// ("all-update-old"), case-insensitively.
pub fn parse_row_filter(mode: ChangeMode, filter: Option<&str>) -> Result<RowFilter> {
    let Some(filter) = filter else {
        return Ok(RowFilter::default_for(mode));
    };

    let normalized = filter.split_whitespace().collect::<Vec<_>>().join("-");
    let parsed = match mode {
        ChangeMode::All => AllChangesFilter::from_str(&normalized, true).map(RowFilter::All),
        ChangeMode::Net => NetChangesFilter::from_str(&normalized, true).map(RowFilter::Net),
    };
    parsed.map_err(|_| anyhow!("'{}' is not a valid row filter for {} mode", filter, mode))
}
