// ABOUTME: Change-set orchestrator - resolves the window, fetches, maps and merges
// ABOUTME: Restarts the cycle once when an update pair is split across the window

use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::columns::ChangedColumnResolver;
use super::error::{CdcError, Result};
use super::fetch::{fetch_raw_changes, ChangeQuery};
use super::lsn::Lsn;
use super::mapper::map_row;
use super::mask::UpdateMask;
use super::merge::merge_update_pairs;
use super::options::{AllChangesFilter, ChangeMode, NetChangesFilter, RowFilter};
use super::record::{ChangeRecord, ChangeSet};
use super::source::ChangeSource;
use super::window;

/// A split update pair is retried once; the second failure is returned.
const MAX_ATTEMPTS: usize = 2;

/// Assembles [`ChangeSet`]s from a caller-owned [`ChangeSource`].
///
/// The assembler only borrows the source and issues strictly sequential
/// requests on it. Every await is raced against the cancellation token, so a
/// call can be abandoned between round trips.
///
/// # Example
///
/// ```rust,ignore
/// let mut source = SqlServerSource::connect(&config).await?;
/// let mut assembler = ChangeSetAssembler::new(&mut source);
/// let changes = assembler.get_all_changes("dbo_Customers", None, None).await?;
/// for row in &changes.rows {
///     println!("{:?} {:?}", row.operation, row.changed_columns);
/// }
/// ```
pub struct ChangeSetAssembler<'a, S: ChangeSource + ?Sized> {
    source: &'a mut S,
    cancel: CancellationToken,
}

/// Rows read from one resolved window.
struct WindowRows {
    rows: Vec<ChangeRecord>,
    to_lsn: Lsn,
}

impl<'a, S: ChangeSource + ?Sized> ChangeSetAssembler<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        Self {
            source,
            cancel: CancellationToken::new(),
        }
    }

    /// Abandon in-flight calls when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Every change in the window, with update pairs merged.
    ///
    /// `from_lsn` defaults to the minimum retained LSN of the capture
    /// instance, `filter` to `all update old`.
    pub async fn get_all_changes(
        &mut self,
        capture_instance: &str,
        from_lsn: Option<&Lsn>,
        filter: Option<AllChangesFilter>,
    ) -> Result<ChangeSet> {
        self.get_changes(
            capture_instance,
            from_lsn,
            RowFilter::All(filter.unwrap_or_default()),
        )
        .await
    }

    /// The net effect per key in the window. `filter` defaults to
    /// `all with mask`.
    pub async fn get_net_changes(
        &mut self,
        capture_instance: &str,
        from_lsn: Option<&Lsn>,
        filter: Option<NetChangesFilter>,
    ) -> Result<ChangeSet> {
        self.get_changes(
            capture_instance,
            from_lsn,
            RowFilter::Net(filter.unwrap_or_default()),
        )
        .await
    }

    /// Assemble a change set for the mode implied by `filter`.
    pub async fn get_changes(
        &mut self,
        capture_instance: &str,
        from_lsn: Option<&Lsn>,
        filter: RowFilter,
    ) -> Result<ChangeSet> {
        require_capture_instance(capture_instance)?;

        let mode = filter.mode();
        let mut change_set = ChangeSet::new(capture_instance, mode == ChangeMode::Net);
        change_set.source_name = guarded(
            &self.cancel,
            self.source.list_source_names(Some(capture_instance)),
        )
        .await?
        .into_iter()
        .next();
        change_set.binary_column_names = guarded(
            &self.cancel,
            self.source.list_binary_column_names(capture_instance),
        )
        .await?;

        // scoped to this call, shared by both attempts
        let mut resolver = ChangedColumnResolver::new(capture_instance);

        let mut attempt = 1;
        let window = loop {
            match self
                .read_window(&mut resolver, capture_instance, from_lsn, filter)
                .await
            {
                Ok(window) => break window,
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(
                        "Retrying {} changes for {} after attempt {}: {}",
                        mode,
                        capture_instance,
                        attempt,
                        err
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };

        if let Some(window) = window {
            change_set.rows = window.rows;
            change_set.last_lsn = Some(window.to_lsn);
        }

        tracing::info!(
            "Assembled {} {} change rows for {} (last LSN {}, {} mask lookups)",
            change_set.rows.len(),
            mode,
            capture_instance,
            change_set
                .last_lsn
                .as_ref()
                .map(Lsn::to_hex)
                .unwrap_or_else(|| "none".to_string()),
            resolver.source_lookups()
        );

        Ok(change_set)
    }

    /// Resolve one update mask to column names.
    pub async fn get_changed_columns(
        &mut self,
        capture_instance: &str,
        update_mask: &UpdateMask,
    ) -> Result<Vec<String>> {
        require_capture_instance(capture_instance)?;

        let mut resolver = ChangedColumnResolver::new(capture_instance);
        let names = guarded(&self.cancel, resolver.resolve(&mut *self.source, update_mask)).await?;
        Ok(names.to_vec())
    }

    /// One pass over the window. `Ok(None)` means there was nothing to read.
    async fn read_window(
        &mut self,
        resolver: &mut ChangedColumnResolver,
        capture_instance: &str,
        from_lsn: Option<&Lsn>,
        filter: RowFilter,
    ) -> Result<Option<WindowRows>> {
        let Some(from) = guarded(
            &self.cancel,
            window::resolve_from(&mut *self.source, capture_instance, from_lsn),
        )
        .await?
        else {
            return Ok(None);
        };

        let Some(to) = guarded(&self.cancel, window::resolve_to(&mut *self.source)).await? else {
            return Ok(None);
        };

        if from > to {
            tracing::debug!(
                "Window start {} is past the maximum LSN {} for {}",
                from,
                to,
                capture_instance
            );
            return Ok(None);
        }

        let query = ChangeQuery::new(capture_instance, from, to, filter);
        let raw_rows = guarded(&self.cancel, fetch_raw_changes(&mut *self.source, &query)).await?;

        let mut rows = Vec::with_capacity(raw_rows.len());
        for raw in raw_rows {
            let mut record = map_row(raw)?;
            guarded(&self.cancel, resolver.apply(&mut *self.source, &mut record)).await?;
            rows.push(record);
        }

        if query.mode() == ChangeMode::All {
            merge_update_pairs(&mut rows)?;
        }

        Ok(Some(WindowRows {
            rows,
            to_lsn: query.to_lsn,
        }))
    }
}

fn require_capture_instance(capture_instance: &str) -> Result<()> {
    if capture_instance.trim().is_empty() {
        return Err(CdcError::invalid_argument("capture instance is required"));
    }
    Ok(())
}

/// Await `fut` unless `cancel` fires first.
async fn guarded<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CdcError::Cancelled),
        result = fut => result,
    }
}
