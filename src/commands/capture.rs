// ABOUTME: `capture-instances` command - list CDC capture instances
// ABOUTME: Groups capture tables by source table name

use anyhow::Result;
use clap::Args;
use serde_json::{Map, Value};

use super::{connect, print_json, ConnectionOverrides};

#[derive(Args, Debug)]
pub struct CaptureArgs {
    /// Only list capture instances of this source table
    #[arg(long)]
    pub source_name: Option<String>,
}

pub async fn capture_instances(args: CaptureArgs, overrides: &ConnectionOverrides) -> Result<()> {
    let mut source = connect(overrides).await?;
    let groups = source
        .capture_instances(args.source_name.as_deref())
        .await?;

    tracing::info!("Found {} captured source tables", groups.len());

    let mut output = Map::new();
    for (source_name, tables) in groups {
        output.insert(source_name, serde_json::to_value(tables)?);
    }

    print_json(&Value::Object(output), true)
}
