// ABOUTME: `changed-columns` command - decode update masks against captured columns
// ABOUTME: Prints changed names, a column ordinal, a changed flag or the captured columns

use anyhow::{bail, Context, Result};
use clap::Args;

use super::{connect, print_json, ConnectionOverrides};
use crate::changes::{ChangeSetAssembler, UpdateMask};

#[derive(Args, Debug)]
pub struct ChangedColumnsArgs {
    /// Capture instance the mask belongs to
    #[arg(long)]
    pub capture_instance: String,
    /// Update mask as hex, e.g. 0x05
    #[arg(long)]
    pub mask: Option<String>,
    /// Column to look up; prints its ordinal, or whether it changed when --mask is given
    #[arg(long)]
    pub column: Option<String>,
    /// List the columns tracked by the capture instance
    #[arg(long, conflicts_with_all = ["mask", "column"])]
    pub list: bool,
}

#[derive(Debug, PartialEq)]
enum ColumnLookup {
    ChangedNames(UpdateMask),
    Ordinal(String),
    HasChanged(String, UpdateMask),
    Captured,
}

impl ChangedColumnsArgs {
    fn lookup(&self) -> Result<ColumnLookup> {
        if self.list {
            return Ok(ColumnLookup::Captured);
        }
        let mask = self.mask.as_deref().map(parse_mask).transpose()?;
        match (self.column.clone(), mask) {
            (Some(column), Some(mask)) => Ok(ColumnLookup::HasChanged(column, mask)),
            (Some(column), None) => Ok(ColumnLookup::Ordinal(column)),
            (None, Some(mask)) => Ok(ColumnLookup::ChangedNames(mask)),
            (None, None) => bail!("Pass --mask, --column or --list"),
        }
    }
}

pub async fn changed_columns(
    args: ChangedColumnsArgs,
    overrides: &ConnectionOverrides,
) -> Result<()> {
    let lookup = args.lookup()?;
    let mut source = connect(overrides).await?;
    let capture_instance = args.capture_instance.as_str();

    match lookup {
        ColumnLookup::ChangedNames(mask) => {
            let names = ChangeSetAssembler::new(&mut source)
                .get_changed_columns(capture_instance, &mask)
                .await?;
            print_json(&names, false)
        }
        ColumnLookup::Ordinal(column) => {
            let ordinal = source.column_ordinal(capture_instance, &column).await?;
            if ordinal.is_none() {
                tracing::warn!("Column {} is not captured by {}", column, capture_instance);
            }
            print_json(&ordinal, false)
        }
        ColumnLookup::HasChanged(column, mask) => {
            let changed = source
                .has_column_changed(capture_instance, &column, &mask)
                .await?;
            print_json(&changed, false)
        }
        ColumnLookup::Captured => {
            let columns = source.captured_columns(capture_instance).await?;
            print_json(&columns, true)
        }
    }
}

fn parse_mask(value: &str) -> Result<UpdateMask> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(digits)
        .with_context(|| format!("Update mask '{}' is not valid hex", value))?;
    Ok(UpdateMask::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(mask: Option<&str>, column: Option<&str>, list: bool) -> ChangedColumnsArgs {
        ChangedColumnsArgs {
            capture_instance: "dbo_Customers".to_string(),
            mask: mask.map(str::to_string),
            column: column.map(str::to_string),
            list,
        }
    }

    #[test]
    fn test_parse_mask() {
        assert_eq!(parse_mask("0x05").unwrap(), UpdateMask::new(vec![0x05]));
        assert_eq!(parse_mask("0180").unwrap(), UpdateMask::new(vec![0x01, 0x80]));
        assert!(parse_mask("0xZZ").is_err());
        assert!(parse_mask("0x5").is_err());
    }

    #[test]
    fn test_lookup_picks_operation_from_flags() {
        let mask = UpdateMask::new(vec![0x06]);
        assert_eq!(
            args(Some("0x06"), None, false).lookup().unwrap(),
            ColumnLookup::ChangedNames(mask.clone())
        );
        assert_eq!(
            args(None, Some("Email"), false).lookup().unwrap(),
            ColumnLookup::Ordinal("Email".to_string())
        );
        assert_eq!(
            args(Some("0x06"), Some("Email"), false).lookup().unwrap(),
            ColumnLookup::HasChanged("Email".to_string(), mask)
        );
        assert_eq!(args(None, None, true).lookup().unwrap(), ColumnLookup::Captured);
    }

    #[test]
    fn test_lookup_requires_a_flag() {
        let err = args(None, None, false).lookup().unwrap_err();
        assert!(err.to_string().contains("--mask"));
        assert!(args(Some("zz"), Some("Email"), false).lookup().is_err());
    }
}
