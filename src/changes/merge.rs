// ABOUTME: Merge engine folding UpdateOld/Update row pairs into single records
// ABOUTME: Signals a retryable error when a pair is split across the window

use super::error::{CdcError, Result};
use super::record::{ChangeRecord, Operation};

/// Merge adjacent update pre-/post-image pairs in place.
///
/// Every `UpdateOld` candidate must be immediately followed by its `Update`
/// row. The `Update` row survives, gains the old values of every column both
/// rows flag as changed, and is marked `merged`; the `UpdateOld` row is
/// removed. Rows that are already merged, are not updates, or carry an empty
/// mask are left alone.
///
/// Changed columns must already be resolved for every candidate row.
pub fn merge_update_pairs(rows: &mut Vec<ChangeRecord>) -> Result<()> {
    let mut pending_before: Option<usize> = None;
    let mut merged_pairs = 0usize;
    let mut i = 0;

    while i < rows.len() {
        let row = &rows[i];
        if row.merged || !row.is_merge_candidate() {
            i += 1;
            continue;
        }

        if row.changed_columns.is_none() {
            return Err(CdcError::RequireColumnsResolution(format!(
                "row {} ({:?}) has no resolved changed columns",
                i, row.operation
            )));
        }

        if let Some(before) = pending_before {
            if i != before + 1 || row.operation != Operation::Update {
                return Err(CdcError::MissingCorrespondingOperation {
                    previous: before,
                    current: Some(i),
                    message: format!(
                        "{:?} row {} is followed by {:?} row {}",
                        Operation::UpdateOld,
                        before,
                        row.operation,
                        i
                    ),
                });
            }

            let old_row = rows.remove(before);
            // the Update row shifted into the removed slot
            let new_row = &mut rows[before];
            copy_old_values(&old_row, new_row);
            new_row.merged = true;

            pending_before = None;
            merged_pairs += 1;
            // `before` now holds the merged row; the next unseen row is at `i`
            continue;
        }

        if row.operation == Operation::UpdateOld {
            pending_before = Some(i);
        }
        i += 1;
    }

    if let Some(before) = pending_before {
        return Err(CdcError::MissingCorrespondingOperation {
            previous: before,
            current: None,
            message: format!(
                "{:?} row {} has no following {:?} row",
                Operation::UpdateOld,
                before,
                Operation::Update
            ),
        });
    }

    if merged_pairs > 0 {
        tracing::debug!("Merged {} update pairs", merged_pairs);
    }

    Ok(())
}

fn copy_old_values(old_row: &ChangeRecord, new_row: &mut ChangeRecord) {
    let (Some(old_columns), Some(new_columns)) =
        (&old_row.changed_columns, new_row.changed_columns.as_mut())
    else {
        return;
    };

    for (name, old) in old_columns.iter() {
        if let Some(column) = new_columns.get_mut(name) {
            column.old_value = old.old_value.clone();
            column.has_old_value = old.has_old_value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::lsn::Lsn;
    use crate::changes::mask::UpdateMask;
    use crate::changes::record::ChangedColumnValue;
    use crate::changes::values::{ColumnMap, ColumnValue};

    fn row(operation: Operation, lsn: u8, changed: &[(&str, &str)]) -> ChangeRecord {
        let mut record = ChangeRecord {
            start_lsn: Lsn::new(vec![0, lsn]),
            operation,
            update_mask: UpdateMask::new(vec![0x01]),
            ..Default::default()
        };
        let mut columns = ColumnMap::new();
        for (name, value) in changed {
            record.columns.insert(*name, ColumnValue::from(*value));
            let entry = if operation == Operation::UpdateOld {
                ChangedColumnValue {
                    old_value: ColumnValue::from(*value),
                    has_old_value: true,
                    ..Default::default()
                }
            } else {
                ChangedColumnValue {
                    new_value: ColumnValue::from(*value),
                    ..Default::default()
                }
            };
            columns.insert(*name, entry);
        }
        record.changed_columns = Some(columns);
        record
    }

    fn insert(lsn: u8) -> ChangeRecord {
        ChangeRecord {
            start_lsn: Lsn::new(vec![0, lsn]),
            operation: Operation::Insert,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_pair_merges() {
        let mut rows = vec![
            row(Operation::UpdateOld, 1, &[("Name", "A")]),
            row(Operation::Update, 1, &[("Name", "B")]),
        ];

        merge_update_pairs(&mut rows).unwrap();

        assert_eq!(rows.len(), 1);
        let merged = &rows[0];
        assert_eq!(merged.operation, Operation::Update);
        assert!(merged.merged);
        let name = merged.changed_columns.as_ref().unwrap().get("Name").unwrap();
        assert_eq!(name.old_value, ColumnValue::from("A"));
        assert_eq!(name.new_value, ColumnValue::from("B"));
        assert!(name.has_old_value);
    }

    #[test]
    fn test_consecutive_pairs_and_other_rows() {
        let mut rows = vec![
            insert(1),
            row(Operation::UpdateOld, 2, &[("Name", "A")]),
            row(Operation::Update, 2, &[("Name", "B")]),
            row(Operation::UpdateOld, 3, &[("Name", "B")]),
            row(Operation::Update, 3, &[("Name", "C")]),
            insert(4),
        ];

        merge_update_pairs(&mut rows).unwrap();

        assert_eq!(rows.len(), 4);
        let ops: Vec<_> = rows.iter().map(|r| r.operation).collect();
        assert_eq!(
            ops,
            vec![
                Operation::Insert,
                Operation::Update,
                Operation::Update,
                Operation::Insert
            ]
        );
        let second = rows[2].changed_columns.as_ref().unwrap().get("Name").unwrap();
        assert_eq!(second.old_value, ColumnValue::from("B"));
        assert_eq!(second.new_value, ColumnValue::from("C"));
        assert_eq!(rows[2].start_lsn, Lsn::new(vec![0, 3]));
    }

    #[test]
    fn test_only_shared_columns_receive_old_values() {
        let mut rows = vec![
            row(Operation::UpdateOld, 1, &[("Name", "A"), ("City", "Oslo")]),
            row(Operation::Update, 1, &[("Name", "B"), ("Email", "b@x")]),
        ];

        merge_update_pairs(&mut rows).unwrap();

        let changed = rows[0].changed_columns.as_ref().unwrap();
        assert!(changed.get("Name").unwrap().has_old_value);
        assert!(!changed.get("Email").unwrap().has_old_value);
        assert!(changed.get("City").is_none());
    }

    #[test]
    fn test_trailing_update_old_fails() {
        let mut rows = vec![
            insert(1),
            row(Operation::UpdateOld, 2, &[("Name", "A")]),
        ];

        let err = merge_update_pairs(&mut rows).unwrap_err();
        assert!(matches!(
            err,
            CdcError::MissingCorrespondingOperation {
                previous: 1,
                current: None,
                ..
            }
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_reversed_pair_is_not_merged() {
        // same start_lsn and seqval, Update delivered ahead of UpdateOld
        let mut rows = vec![
            row(Operation::Update, 1, &[("Name", "B")]),
            row(Operation::UpdateOld, 1, &[("Name", "A")]),
        ];

        let err = merge_update_pairs(&mut rows).unwrap_err();
        assert!(matches!(
            err,
            CdcError::MissingCorrespondingOperation {
                previous: 1,
                current: None,
                ..
            }
        ));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_update_old_followed_by_update_old_fails() {
        let mut rows = vec![
            row(Operation::UpdateOld, 1, &[("Name", "A")]),
            row(Operation::UpdateOld, 2, &[("Name", "B")]),
        ];

        let err = merge_update_pairs(&mut rows).unwrap_err();
        assert!(matches!(
            err,
            CdcError::MissingCorrespondingOperation {
                previous: 0,
                current: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn test_row_between_pair_breaks_adjacency() {
        let mut rows = vec![
            row(Operation::UpdateOld, 1, &[("Name", "A")]),
            insert(2),
            row(Operation::Update, 1, &[("Name", "B")]),
        ];

        let err = merge_update_pairs(&mut rows).unwrap_err();
        assert!(matches!(
            err,
            CdcError::MissingCorrespondingOperation {
                previous: 0,
                current: Some(2),
                ..
            }
        ));
    }

    #[test]
    fn test_unresolved_columns_fail_fast() {
        let mut unresolved = row(Operation::Update, 1, &[("Name", "B")]);
        unresolved.changed_columns = None;
        let mut rows = vec![unresolved];

        let err = merge_update_pairs(&mut rows).unwrap_err();
        assert!(matches!(err, CdcError::RequireColumnsResolution(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_lone_update_is_kept_unmerged() {
        let mut rows = vec![row(Operation::Update, 1, &[("Name", "B")])];

        merge_update_pairs(&mut rows).unwrap();

        assert_eq!(rows.len(), 1);
        assert!(!rows[0].merged);
    }

    #[test]
    fn test_zero_mask_rows_are_skipped() {
        let mut old = row(Operation::UpdateOld, 1, &[]);
        old.update_mask = UpdateMask::new(vec![0x00]);
        old.changed_columns = None;
        let mut rows = vec![old, insert(2)];

        merge_update_pairs(&mut rows).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_already_merged_rows_are_not_merged_twice() {
        let mut rows = vec![
            row(Operation::UpdateOld, 1, &[("Name", "A")]),
            row(Operation::Update, 1, &[("Name", "B")]),
        ];
        merge_update_pairs(&mut rows).unwrap();
        let snapshot = rows.clone();

        merge_update_pairs(&mut rows).unwrap();
        assert_eq!(rows, snapshot);
    }
}
