// ABOUTME: Scripted in-memory ChangeSource shared by integration tests
// ABOUTME: Serves queued fetch windows and counts every round trip

#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use cdc_changeset::changes::{
    ChangeQuery, ChangeSource, ColumnMap, ColumnValue, Lsn, Result, UpdateMask,
};
use std::collections::VecDeque;

pub const CAPTURE_INSTANCE: &str = "dbo_Customers";

/// Captured columns in ordinal order: Id = 1, Name = 2, Email = 3, Photo = 4.
pub const CAPTURED_COLUMNS: [&str; 4] = ["Id", "Name", "Email", "Photo"];

pub fn lsn(n: u8) -> Lsn {
    Lsn::new(vec![0, 0, 0, 0, 0, 0, 0, 0, 0, n])
}

/// A raw change row as the capture function would return it.
pub fn raw(
    operation: i64,
    start: u8,
    seq: u8,
    mask: &[u8],
    columns: &[(&str, ColumnValue)],
) -> ColumnMap<ColumnValue> {
    let mut row: ColumnMap<ColumnValue> = ColumnMap::new();
    row.insert("__$start_lsn", ColumnValue::Binary(lsn(start).as_bytes().to_vec()));
    row.insert("__$seqval", ColumnValue::Binary(lsn(seq).as_bytes().to_vec()));
    row.insert("__$operation", ColumnValue::Int(operation));
    row.insert("__$update_mask", ColumnValue::Binary(mask.to_vec()));
    for (name, value) in columns {
        row.insert(*name, value.clone());
    }
    row
}

pub fn customer(id: i64, name: &str) -> Vec<(&'static str, ColumnValue)> {
    vec![("Id", ColumnValue::Int(id)), ("Name", ColumnValue::from(name))]
}

/// Change source driven by pre-scripted responses.
///
/// Each `fetch_changes` call pops the next scripted window; each
/// `get_max_lsn` pops the next scripted max LSN, repeating the last one once
/// the script runs out.
#[derive(Default)]
pub struct ScriptedSource {
    pub min_lsn: Option<Lsn>,
    pub max_lsns: VecDeque<Option<Lsn>>,
    pub windows: VecDeque<Vec<ColumnMap<ColumnValue>>>,
    pub binary_columns: Vec<String>,
    pub source_names: Vec<String>,
    pub fetch_error: Option<String>,

    pub queries: Vec<ChangeQuery>,
    pub min_calls: usize,
    pub max_calls: usize,
    pub mask_calls: usize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            min_lsn: Some(lsn(1)),
            source_names: vec!["Customers".to_string()],
            binary_columns: vec!["Photo".to_string()],
            ..Default::default()
        }
    }

    pub fn with_max_lsns(mut self, lsns: impl IntoIterator<Item = Option<Lsn>>) -> Self {
        self.max_lsns = lsns.into_iter().collect();
        self
    }

    pub fn with_window(mut self, rows: Vec<ColumnMap<ColumnValue>>) -> Self {
        self.windows.push_back(rows);
        self
    }

    pub fn fetch_calls(&self) -> usize {
        self.queries.len()
    }
}

#[async_trait]
impl ChangeSource for ScriptedSource {
    async fn fetch_changes(&mut self, query: &ChangeQuery) -> Result<Vec<ColumnMap<ColumnValue>>> {
        self.queries.push(query.clone());
        if let Some(message) = &self.fetch_error {
            return Err(anyhow!(message.clone()).into());
        }
        Ok(self.windows.pop_front().unwrap_or_default())
    }

    async fn get_min_lsn(&mut self, _capture_instance: &str) -> Result<Option<Lsn>> {
        self.min_calls += 1;
        Ok(self.min_lsn.clone())
    }

    async fn get_max_lsn(&mut self) -> Result<Option<Lsn>> {
        self.max_calls += 1;
        let next = if self.max_lsns.len() > 1 {
            self.max_lsns.pop_front()
        } else {
            self.max_lsns.front().cloned()
        };
        Ok(next.flatten())
    }

    async fn resolve_changed_column_names(
        &mut self,
        _capture_instance: &str,
        update_mask: &UpdateMask,
    ) -> Result<Vec<String>> {
        self.mask_calls += 1;
        Ok(update_mask
            .changed_ordinals()
            .into_iter()
            .filter_map(|ordinal| CAPTURED_COLUMNS.get(ordinal as usize - 1))
            .map(|name| name.to_string())
            .collect())
    }

    async fn list_binary_column_names(&mut self, _capture_instance: &str) -> Result<Vec<String>> {
        Ok(self.binary_columns.clone())
    }

    async fn list_source_names(&mut self, _capture_instance: Option<&str>) -> Result<Vec<String>> {
        Ok(self.source_names.clone())
    }
}
