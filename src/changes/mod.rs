// ABOUTME: Change-set assembly engine for row-level change logs
// ABOUTME: Window resolution, fetching, row mapping, mask decoding and update merging

pub mod assembler;
pub mod columns;
pub mod error;
pub mod fetch;
pub mod lsn;
pub mod mapper;
pub mod mask;
pub mod merge;
pub mod options;
pub mod record;
pub mod source;
pub mod values;
pub mod window;

#[cfg(test)]
pub(crate) mod test_support;

pub use assembler::ChangeSetAssembler;
pub use columns::ChangedColumnResolver;
pub use error::{CdcError, Result};
pub use fetch::{fetch_raw_changes, ChangeQuery};
pub use lsn::Lsn;
pub use mapper::map_row;
pub use mask::UpdateMask;
pub use merge::merge_update_pairs;
pub use options::{AllChangesFilter, ChangeMode, NetChangesFilter, RelationalOperator, RowFilter};
pub use record::{
    metadata, CaptureTable, CapturedColumn, ChangeRecord, ChangeSet, ChangedColumnValue,
    Operation,
};
pub use source::ChangeSource;
pub use values::{ColumnMap, ColumnValue};
