// ABOUTME: Changed-column resolver - turns update masks into column names
// ABOUTME: Memoizes one source lookup per distinct mask for the current call

use std::collections::HashMap;

use super::error::Result;
use super::mask::UpdateMask;
use super::record::{ChangeRecord, ChangedColumnValue, Operation};
use super::source::ChangeSource;
use super::values::ColumnMap;

/// Resolves update masks for a single capture instance.
///
/// The cache lives exactly as long as the resolver, and the assembler creates
/// one resolver per call, so nothing is shared across calls.
#[derive(Debug)]
pub struct ChangedColumnResolver {
    capture_instance: String,
    cache: HashMap<UpdateMask, Vec<String>>,
    lookups: usize,
}

impl ChangedColumnResolver {
    pub fn new(capture_instance: impl Into<String>) -> Self {
        Self {
            capture_instance: capture_instance.into(),
            cache: HashMap::new(),
            lookups: 0,
        }
    }

    pub fn capture_instance(&self) -> &str {
        &self.capture_instance
    }

    /// Number of distinct masks that went to the source.
    pub fn source_lookups(&self) -> usize {
        self.lookups
    }

    /// Column names flagged by `mask`. Empty or zero masks resolve to an
    /// empty list without touching the source.
    pub async fn resolve<S: ChangeSource + ?Sized>(
        &mut self,
        source: &mut S,
        mask: &UpdateMask,
    ) -> Result<&[String]> {
        if mask.is_empty_or_zero() {
            return Ok(&[]);
        }

        if !self.cache.contains_key(mask) {
            let names = source
                .resolve_changed_column_names(&self.capture_instance, mask)
                .await?;
            self.lookups += 1;
            tracing::trace!(
                "Resolved mask {} on {} to {:?}",
                mask,
                self.capture_instance,
                names
            );
            self.cache.insert(mask.clone(), names);
        }

        Ok(self.cache.get(mask).map(Vec::as_slice).unwrap_or_default())
    }

    /// Populate `record.changed_columns` from its mask and payload.
    ///
    /// UpdateOld rows contribute the old value (and `has_old_value`), Update
    /// rows the new value. Other rows are left untouched.
    pub async fn apply<S: ChangeSource + ?Sized>(
        &mut self,
        source: &mut S,
        record: &mut ChangeRecord,
    ) -> Result<()> {
        if !record.is_merge_candidate() {
            return Ok(());
        }

        let names = self.resolve(source, &record.update_mask).await?;

        let mut changed = ColumnMap::with_capacity(names.len());
        for name in names {
            let value = record.columns.get(name).cloned().unwrap_or_default();
            let entry = match record.operation {
                Operation::UpdateOld => ChangedColumnValue {
                    old_value: value,
                    has_old_value: true,
                    ..Default::default()
                },
                _ => ChangedColumnValue {
                    new_value: value,
                    ..Default::default()
                },
            };
            changed.insert(name.clone(), entry);
        }

        record.changed_columns = Some(changed);
        Ok(())
    }
}
