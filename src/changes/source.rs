// ABOUTME: ChangeSource trait - the contract the assembler consumes
// ABOUTME: Implemented by the SQL Server client and by test doubles

use async_trait::async_trait;

use super::error::Result;
use super::fetch::ChangeQuery;
use super::lsn::Lsn;
use super::mask::UpdateMask;
use super::values::{ColumnMap, ColumnValue};

/// Access to a change-tracking source.
///
/// Every method is a single round trip. Implementations report their own
/// failures as [`CdcError::Source`](super::error::CdcError::Source); the
/// assembler passes them through without retrying.
#[async_trait]
pub trait ChangeSource: Send {
    /// Ordered raw change rows for the query window, ascending by
    /// `(__$start_lsn, __$seqval)`.
    async fn fetch_changes(&mut self, query: &ChangeQuery) -> Result<Vec<ColumnMap<ColumnValue>>>;

    /// Lowest LSN still retained for the capture instance.
    async fn get_min_lsn(&mut self, capture_instance: &str) -> Result<Option<Lsn>>;

    /// Highest LSN written by the capture process so far.
    async fn get_max_lsn(&mut self) -> Result<Option<Lsn>>;

    /// Names of the captured columns flagged in `update_mask`, excluding
    /// identity and row-versioning columns.
    async fn resolve_changed_column_names(
        &mut self,
        capture_instance: &str,
        update_mask: &UpdateMask,
    ) -> Result<Vec<String>>;

    /// Captured columns of a large-binary type.
    async fn list_binary_column_names(&mut self, capture_instance: &str) -> Result<Vec<String>>;

    /// Source tables tracked by the capture instance (all tables when `None`).
    async fn list_source_names(&mut self, capture_instance: Option<&str>) -> Result<Vec<String>>;
}
