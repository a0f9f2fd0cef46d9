// ABOUTME: Raw change fetcher - validates a window query and pulls raw rows
// ABOUTME: Rows come back as case-insensitive column maps in source order

use super::error::{CdcError, Result};
use super::lsn::Lsn;
use super::options::{ChangeMode, RowFilter};
use super::source::ChangeSource;
use super::values::{ColumnMap, ColumnValue};

/// A fully bound request for raw change rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeQuery {
    pub capture_instance: String,
    pub from_lsn: Lsn,
    pub to_lsn: Lsn,
    pub filter: RowFilter,
}

impl ChangeQuery {
    pub fn new(
        capture_instance: impl Into<String>,
        from_lsn: Lsn,
        to_lsn: Lsn,
        filter: RowFilter,
    ) -> Self {
        Self {
            capture_instance: capture_instance.into(),
            from_lsn,
            to_lsn,
            filter,
        }
    }

    pub fn mode(&self) -> ChangeMode {
        self.filter.mode()
    }

    /// Reject blank capture instances and empty window bounds.
    pub fn validate(&self) -> Result<()> {
        if self.capture_instance.trim().is_empty() {
            return Err(CdcError::invalid_argument("capture instance is required"));
        }
        if self.from_lsn.is_empty_or_zero() {
            return Err(CdcError::invalid_argument("from LSN is required"));
        }
        if self.to_lsn.is_empty_or_zero() {
            return Err(CdcError::invalid_argument("to LSN is required"));
        }
        Ok(())
    }
}

/// Fetch raw rows for `query` after validating it.
pub async fn fetch_raw_changes<S: ChangeSource + ?Sized>(
    source: &mut S,
    query: &ChangeQuery,
) -> Result<Vec<ColumnMap<ColumnValue>>> {
    query.validate()?;

    let rows = source.fetch_changes(query).await?;

    tracing::debug!(
        "Fetched {} raw {} change rows for {} in [{}, {}] ({})",
        rows.len(),
        query.mode(),
        query.capture_instance,
        query.from_lsn,
        query.to_lsn,
        query.filter
    );

    Ok(rows)
}
