use super::{BoundaryFilter, ChainSource, SourceError, Strategy};
use crate::store::{RecordStoreExt, Store};
use index_pipeline::Heights;
use std::collections::BTreeSet;

/// Which stored heights a reindex revisits.
#[derive(Debug, Clone, Default)]
pub struct ReindexFilter {
    pub boundary: Option<BoundaryFilter>,
    /// `section.method` transaction kinds.
    pub transaction_kinds: Vec<String>,
    pub start: u64,
    /// Defaults to the most recent stored height.
    pub end: Option<u64>,
}

impl ReindexFilter {
    fn is_unfiltered(&self) -> bool {
        self.boundary.is_none() && self.transaction_kinds.is_empty()
    }
}

/// Sorted union of the heights matching any filter. Without filters every stored height in
/// bounds is revisited. `resume` holds the bounds of a resumed report, which replace the
/// requested ones.
pub async fn reindex_source(
    store: &dyn Store,
    filter: &ReindexFilter,
    resume: Option<(u64, u64)>,
) -> Result<ChainSource, SourceError> {
    let (start, end) = match (resume, filter.end) {
        (Some(bounds), _) => bounds,
        (None, Some(end)) => (filter.start, end),
        (None, None) => match store.find_most_recent_syncable().await? {
            Some(s) => (filter.start, s.height),
            None => return Err(SourceError::NothingToReindex),
        },
    };
    if start > end {
        return Err(SourceError::InvalidRange { start, end });
    }

    let mut whitelist = BTreeSet::new();
    if filter.is_unfiltered() {
        whitelist.extend(store.find_syncable_heights(start, end).await?);
    }
    if let Some(boundary) = filter.boundary {
        whitelist.extend(store.find_boundary_heights(start, end, boundary).await?);
    }
    if !filter.transaction_kinds.is_empty() {
        whitelist.extend(
            store
                .find_transaction_heights(&filter.transaction_kinds, start, end)
                .await?,
        );
    }

    if whitelist.is_empty() {
        return Err(SourceError::NothingToReindex);
    }
    tracing::debug!(start, end, heights = whitelist.len(), "reindex source resolved");
    Ok(ChainSource::new(
        Strategy::Reindex,
        Heights::list(whitelist.into_iter().collect()),
    ))
}
