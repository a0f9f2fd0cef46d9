// ABOUTME: Conversion from tiberius rows to engine column maps
// ABOUTME: Temporal types go through chrono, everything else maps by TDS variant

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use tiberius::{ColumnData, FromSql, Row};

use crate::changes::{ColumnMap, ColumnValue};

/// Convert one result row into an ordered, case-insensitive column map.
pub fn row_to_column_map(row: Row) -> ColumnMap<ColumnValue> {
    let names: Vec<String> = row
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();

    names
        .into_iter()
        .zip(row)
        .map(|(name, data)| (name, column_value(&data)))
        .collect()
}

/// Map a single TDS value. SQL NULL of any type becomes [`ColumnValue::Null`].
pub fn column_value(data: &ColumnData<'static>) -> ColumnValue {
    match data {
        ColumnData::U8(v) => v.map(i64::from).into(),
        ColumnData::I16(v) => v.map(i64::from).into(),
        ColumnData::I32(v) => v.map(i64::from).into(),
        ColumnData::I64(v) => (*v).into(),
        ColumnData::F32(v) => v.map(|f| ColumnValue::Float(f64::from(f))).unwrap_or_default(),
        ColumnData::F64(v) => v.map(ColumnValue::Float).unwrap_or_default(),
        ColumnData::Bit(v) => (*v).into(),
        ColumnData::String(v) => v.as_ref().map(|s| s.to_string()).into(),
        ColumnData::Guid(v) => v.map(|g| g.to_string()).into(),
        ColumnData::Binary(v) => v.as_ref().map(|b| b.to_vec()).into(),
        ColumnData::Numeric(v) => v.map(|n| n.to_string()).into(),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|xml| xml.clone().into_owned().into_string())
            .into(),
        temporal => temporal_value(temporal),
    }
}

fn temporal_value(data: &ColumnData<'static>) -> ColumnValue {
    if let Ok(Some(v)) = NaiveDateTime::from_sql(data) {
        return ColumnValue::DateTime(v);
    }
    if let Ok(Some(v)) = DateTime::<FixedOffset>::from_sql(data) {
        return ColumnValue::Text(v.to_rfc3339());
    }
    if let Ok(Some(v)) = NaiveDate::from_sql(data) {
        return ColumnValue::Text(v.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(v)) = NaiveTime::from_sql(data) {
        return ColumnValue::Text(v.format("%H:%M:%S%.f").to_string());
    }
    ColumnValue::Null
}
