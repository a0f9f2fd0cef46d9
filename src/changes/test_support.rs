// ABOUTME: Minimal ChangeSource double for unit tests inside the crate
// ABOUTME: Resolves masks against a fixed captured-column list

use async_trait::async_trait;

use super::error::Result;
use super::fetch::ChangeQuery;
use super::lsn::Lsn;
use super::mask::UpdateMask;
use super::source::ChangeSource;
use super::values::{ColumnMap, ColumnValue};

/// Captured columns are numbered from ordinal 1 in the given order.
pub struct MaskOnlySource {
    columns: Vec<String>,
    pub calls: usize,
}

impl MaskOnlySource {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            calls: 0,
        }
    }
}

#[async_trait]
impl ChangeSource for MaskOnlySource {
    async fn fetch_changes(&mut self, _query: &ChangeQuery) -> Result<Vec<ColumnMap<ColumnValue>>> {
        Ok(Vec::new())
    }

    async fn get_min_lsn(&mut self, _capture_instance: &str) -> Result<Option<Lsn>> {
        Ok(None)
    }

    async fn get_max_lsn(&mut self) -> Result<Option<Lsn>> {
        Ok(None)
    }

    async fn resolve_changed_column_names(
        &mut self,
        _capture_instance: &str,
        update_mask: &UpdateMask,
    ) -> Result<Vec<String>> {
        self.calls += 1;
        Ok(update_mask
            .changed_ordinals()
            .into_iter()
            .filter_map(|ordinal| self.columns.get(ordinal as usize - 1).cloned())
            .collect())
    }

    async fn list_binary_column_names(&mut self, _capture_instance: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn list_source_names(&mut self, _capture_instance: Option<&str>) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
