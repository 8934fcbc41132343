use super::{BoundaryFilter, ChainSource, SourceError, Strategy};
use crate::store::Store;
use index_pipeline::Heights;

/// Span of heights stored under a version other than the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutdatedRange {
    pub start: u64,
    pub end: u64,
    /// Smallest outdated index version stored anywhere in the span.
    pub oldest_version: i64,
}

pub async fn scan_outdated(store: &dyn Store, current_version: i64) -> Result<OutdatedRange, SourceError> {
    let first = store.find_first_with_other_version(current_version).await?;
    let last = store.find_last_with_other_version(current_version).await?;
    let oldest = store.find_oldest_other_version(current_version).await?;
    match (first, last, oldest) {
        (Some(first), Some(last), Some(oldest_version)) => Ok(OutdatedRange {
            start: first.height,
            end: last.height,
            oldest_version,
        }),
        _ => Err(SourceError::NothingToBackfill(current_version)),
    }
}

/// Dense range over `range`, or its boundary heights when `filter` is set. `resume` holds the
/// bounds of a resumed report, which replace the scanned ones.
pub async fn backfill_source(
    store: &dyn Store,
    range: OutdatedRange,
    filter: Option<BoundaryFilter>,
    resume: Option<(u64, u64)>,
) -> Result<ChainSource, SourceError> {
    let (start, end) = resume.unwrap_or((range.start, range.end));
    if start > end {
        return Err(SourceError::NothingToBackfill(range.oldest_version));
    }

    let heights = match filter {
        Some(filter) => {
            let boundaries = store.find_boundary_heights(start, end, filter).await?;
            if boundaries.is_empty() {
                return Err(SourceError::NothingToBackfill(range.oldest_version));
            }
            Heights::list(boundaries)
        }
        None => Heights::range(start, end),
    };

    tracing::debug!(start, end, heights = heights.total(), ?filter, "backfill source resolved");
    Ok(ChainSource::new(Strategy::Backfill, heights))
}
