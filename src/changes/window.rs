// ABOUTME: LSN window resolver - finds the [from, to] bounds of a change query
// ABOUTME: Empty or zero LSNs from the source are treated as "no position"

use super::error::Result;
use super::lsn::Lsn;
use super::source::ChangeSource;

/// Resolve the lower bound of the window.
///
/// A supplied, non-zero LSN is used as-is. Otherwise the minimum LSN retained
/// for the capture instance is looked up; `None` means the capture instance
/// currently holds no changes.
pub async fn resolve_from<S: ChangeSource + ?Sized>(
    source: &mut S,
    capture_instance: &str,
    supplied_from: Option<&Lsn>,
) -> Result<Option<Lsn>> {
    if let Some(lsn) = supplied_from.filter(|lsn| !lsn.is_empty_or_zero()) {
        return Ok(Some(lsn.clone()));
    }

    let min_lsn = source
        .get_min_lsn(capture_instance)
        .await?
        .and_then(Lsn::into_option);

    match &min_lsn {
        Some(lsn) => tracing::debug!("Minimum LSN for {} is {}", capture_instance, lsn),
        None => tracing::debug!("No retained changes for {}", capture_instance),
    }

    Ok(min_lsn)
}

/// Resolve the upper bound of the window from the source's current maximum LSN.
pub async fn resolve_to<S: ChangeSource + ?Sized>(source: &mut S) -> Result<Option<Lsn>> {
    let max_lsn = source.get_max_lsn().await?.and_then(Lsn::into_option);

    if max_lsn.is_none() {
        tracing::debug!("Capture process has not produced a maximum LSN yet");
    }

    Ok(max_lsn)
}
