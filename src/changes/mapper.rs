// ABOUTME: Row mapper turning raw change-log column maps into ChangeRecords
// ABOUTME: Pure structural translation, no column resolution or merging

use super::error::{CdcError, Result};
use super::lsn::Lsn;
use super::mask::UpdateMask;
use super::record::{metadata, ChangeRecord, Operation};
use super::values::{ColumnMap, ColumnValue};

/// Map one raw row into a [`ChangeRecord`].
///
/// The five metadata columns are lifted into typed fields by name
/// (case-insensitively); everything else is copied into `columns` verbatim.
/// NULL metadata leaves the field at its default.
pub fn map_row(raw: ColumnMap<ColumnValue>) -> Result<ChangeRecord> {
    let mut record = ChangeRecord {
        columns: ColumnMap::with_capacity(raw.len().saturating_sub(metadata::ALL.len())),
        ..Default::default()
    };

    for (name, value) in raw {
        if name.eq_ignore_ascii_case(metadata::START_LSN) {
            record.start_lsn = Lsn::new(binary_field(&name, value)?);
        } else if name.eq_ignore_ascii_case(metadata::SEQ_VAL) {
            record.seq_val = Lsn::new(binary_field(&name, value)?);
        } else if name.eq_ignore_ascii_case(metadata::UPDATE_MASK) {
            record.update_mask = UpdateMask::new(binary_field(&name, value)?);
        } else if name.eq_ignore_ascii_case(metadata::OPERATION) {
            record.operation = match value {
                ColumnValue::Null => Operation::None,
                ColumnValue::Int(code) => Operation::try_from(code)?,
                other => return Err(type_mismatch(&name, "int", &other)),
            };
        } else if name.eq_ignore_ascii_case(metadata::UPDATE_TIME) {
            record.update_time = match value {
                ColumnValue::Null => None,
                ColumnValue::DateTime(time) => Some(time),
                other => return Err(type_mismatch(&name, "datetime", &other)),
            };
        } else {
            record.columns.insert(name, value);
        }
    }

    Ok(record)
}

fn binary_field(name: &str, value: ColumnValue) -> Result<Vec<u8>> {
    match value {
        ColumnValue::Null => Ok(Vec::new()),
        ColumnValue::Binary(bytes) => Ok(bytes),
        other => Err(type_mismatch(name, "binary", &other)),
    }
}

fn type_mismatch(name: &str, expected: &str, actual: &ColumnValue) -> CdcError {
    CdcError::InvalidRow(format!(
        "column {} should be {}, got {}",
        name,
        expected,
        actual.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn raw_row() -> ColumnMap<ColumnValue> {
        let time = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        vec![
            ("__$start_lsn", ColumnValue::Binary(vec![0, 0, 0, 1])),
            ("__$seqval", ColumnValue::Binary(vec![0, 0, 0, 2])),
            ("__$operation", ColumnValue::Int(4)),
            ("__$update_mask", ColumnValue::Binary(vec![0x02])),
            ("__$UpdateTime", ColumnValue::DateTime(time)),
            ("Id", ColumnValue::Int(7)),
            ("Name", ColumnValue::from("Grace")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_metadata_lifted_into_fields() {
        let record = map_row(raw_row()).unwrap();
        assert_eq!(record.start_lsn, Lsn::new(vec![0, 0, 0, 1]));
        assert_eq!(record.seq_val, Lsn::new(vec![0, 0, 0, 2]));
        assert_eq!(record.operation, Operation::Update);
        assert_eq!(record.update_mask, UpdateMask::new(vec![0x02]));
        assert!(record.update_time.is_some());
        assert!(record.changed_columns.is_none());
        assert!(!record.merged);
    }

    #[test]
    fn test_business_columns_copied_verbatim() {
        let record = map_row(raw_row()).unwrap();
        assert_eq!(record.columns.len(), 2);
        assert_eq!(record.columns.get("id"), Some(&ColumnValue::Int(7)));
        assert_eq!(record.columns.get("NAME"), Some(&ColumnValue::from("Grace")));
        assert!(!record.columns.contains_key("__$operation"));
    }

    #[test]
    fn test_metadata_names_match_case_insensitively() {
        let raw: ColumnMap<ColumnValue> = vec![
            ("__$START_LSN", ColumnValue::Binary(vec![9])),
            ("__$Operation", ColumnValue::Int(2)),
            ("__$updatetime", ColumnValue::Null),
        ]
        .into_iter()
        .collect();
        let record = map_row(raw).unwrap();
        assert_eq!(record.start_lsn, Lsn::new(vec![9]));
        assert_eq!(record.operation, Operation::Insert);
        assert!(record.update_time.is_none());
        assert!(record.columns.is_empty());
    }

    #[test]
    fn test_wrong_metadata_type_is_invalid_row() {
        let raw: ColumnMap<ColumnValue> = vec![("__$seqval", ColumnValue::from("not bytes"))]
            .into_iter()
            .collect();
        let err = map_row(raw).unwrap_err();
        assert!(matches!(err, CdcError::InvalidRow(msg) if msg.contains("__$seqval")));
    }

    #[test]
    fn test_unknown_operation_code_is_invalid_row() {
        let raw: ColumnMap<ColumnValue> = vec![("__$operation", ColumnValue::Int(42))]
            .into_iter()
            .collect();
        assert!(matches!(map_row(raw), Err(CdcError::InvalidRow(_))));
    }
}
