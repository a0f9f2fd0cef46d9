// ABOUTME: Change records and change sets produced by the assembler
// ABOUTME: Holds typed metadata, business columns and merged old/new values

use chrono::NaiveDateTime;
use serde::Serialize;

use super::error::CdcError;
use super::lsn::Lsn;
use super::mask::UpdateMask;
use super::values::{ColumnMap, ColumnValue};

/// Reserved metadata column names present on every raw change row.
pub mod metadata {
    pub const START_LSN: &str = "__$start_lsn";
    pub const SEQ_VAL: &str = "__$seqval";
    pub const OPERATION: &str = "__$operation";
    pub const UPDATE_MASK: &str = "__$update_mask";
    pub const UPDATE_TIME: &str = "__$UpdateTime";

    pub const ALL: [&str; 5] = [START_LSN, SEQ_VAL, OPERATION, UPDATE_MASK, UPDATE_TIME];
}

/// Operation codes written by the capture process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Operation {
    #[default]
    None,
    Delete,
    Insert,
    /// Pre-image of an update.
    UpdateOld,
    /// Post-image of an update.
    Update,
    /// Net-mode row produced with the `all with merge` filter.
    InsertOrUpdate,
}

impl Operation {
    pub fn code(&self) -> i64 {
        match self {
            Operation::None => 0,
            Operation::Delete => 1,
            Operation::Insert => 2,
            Operation::UpdateOld => 3,
            Operation::Update => 4,
            Operation::InsertOrUpdate => 5,
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Operation::UpdateOld | Operation::Update)
    }
}

impl TryFrom<i64> for Operation {
    type Error = CdcError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Operation::None),
            1 => Ok(Operation::Delete),
            2 => Ok(Operation::Insert),
            3 => Ok(Operation::UpdateOld),
            4 => Ok(Operation::Update),
            5 => Ok(Operation::InsertOrUpdate),
            other => Err(CdcError::InvalidRow(format!(
                "unknown operation code {}",
                other
            ))),
        }
    }
}

/// Old and new value of one changed column.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangedColumnValue {
    pub old_value: ColumnValue,
    pub new_value: ColumnValue,
    /// Distinguishes "old value was NULL" from "old value unknown".
    pub has_old_value: bool,
}

/// One row of the change log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub start_lsn: Lsn,
    pub seq_val: Lsn,
    pub operation: Operation,
    pub update_mask: UpdateMask,
    pub update_time: Option<NaiveDateTime>,
    /// `None` until the changed columns have been resolved for this row.
    pub changed_columns: Option<ColumnMap<ChangedColumnValue>>,
    pub merged: bool,
    pub columns: ColumnMap<ColumnValue>,
}

impl ChangeRecord {
    /// Rows the changed-column resolver and merge engine care about.
    pub fn is_merge_candidate(&self) -> bool {
        self.operation.is_update() && !self.update_mask.is_empty_or_zero()
    }
}

/// Result of one assembly call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    pub source_name: Option<String>,
    pub capture_instance: String,
    /// Upper bound of the window that was read; `None` if nothing was fetched.
    pub last_lsn: Option<Lsn>,
    pub is_net_mode: bool,
    pub binary_column_names: Vec<String>,
    pub rows: Vec<ChangeRecord>,
}

impl ChangeSet {
    pub fn new(capture_instance: impl Into<String>, is_net_mode: bool) -> Self {
        Self {
            capture_instance: capture_instance.into(),
            is_net_mode,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A capture instance and the source table it tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureTable {
    pub source_name: String,
    pub capture_instance: String,
    pub supports_net_changes: bool,
}

/// A column tracked by a capture instance, as listed in `cdc.captured_columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedColumn {
    pub column_name: String,
    /// 1-based position of the column's bit in the update mask
    pub column_ordinal: u32,
    pub column_type: String,
    pub is_computed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_codes_round_trip() {
        for code in 0..=5 {
            assert_eq!(Operation::try_from(code).unwrap().code(), code);
        }
        assert!(matches!(
            Operation::try_from(9),
            Err(CdcError::InvalidRow(_))
        ));
    }

    #[test]
    fn test_merge_candidate_requires_update_and_mask() {
        let mut record = ChangeRecord {
            operation: Operation::Update,
            update_mask: UpdateMask::new(vec![0x02]),
            ..Default::default()
        };
        assert!(record.is_merge_candidate());

        record.update_mask = UpdateMask::new(vec![0x00]);
        assert!(!record.is_merge_candidate());

        record.update_mask = UpdateMask::new(vec![0x02]);
        record.operation = Operation::Insert;
        assert!(!record.is_merge_candidate());
    }

    #[test]
    fn test_new_change_set_is_empty() {
        let set = ChangeSet::new("dbo_Customers", true);
        assert!(set.is_empty());
        assert!(set.is_net_mode);
        assert!(set.last_lsn.is_none());
        assert_eq!(set.capture_instance, "dbo_Customers");
    }
}
