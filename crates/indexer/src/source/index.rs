use super::{ChainSource, SourceError, Strategy};
use crate::chain::cache::MetaCache;
use crate::chain::ChainClient;
use crate::store::Store;
use index_pipeline::Heights;

/// Inputs of a forward index run.
#[derive(Debug, Clone, Copy)]
pub struct IndexBounds {
    /// Explicit first height; skips the store lookup.
    pub start_override: Option<u64>,
    /// Used when the store is empty.
    pub first_height: u64,
    /// Max heights per run; 0 means up to the head.
    pub batch_size: u64,
}

/// Forward range from where the last run left off up to the chain head.
///
/// An unprocessed most-recent height (left behind by a crash) is picked up again. A batch
/// size of exactly 1 with nothing new forces a run over the head height alone.
pub async fn index_source(
    store: &dyn Store,
    chain: &dyn ChainClient,
    cache: &MetaCache,
    bounds: IndexBounds,
) -> Result<ChainSource, SourceError> {
    let start = match bounds.start_override {
        Some(start) => start,
        None => match store.find_most_recent_syncable().await? {
            Some(s) if s.is_processed() => s.height + 1,
            Some(s) => s.height,
            None => bounds.first_height,
        },
    };

    let head = chain.head().await?;
    let head_height = head.height;
    cache.insert(head).await;

    let mut end = head_height;
    if bounds.batch_size > 0 {
        end = end.min(start.saturating_add(bounds.batch_size - 1));
    }

    if start > end {
        if bounds.batch_size == 1 {
            tracing::info!(head = head_height, "nothing new, forcing single-height run at head");
            return Ok(ChainSource::new(Strategy::Index, Heights::range(head_height, head_height)));
        }
        return Err(SourceError::NothingToProcess {
            start,
            head: head_height,
        });
    }

    tracing::debug!(start, end, "index source resolved");
    Ok(ChainSource::new(Strategy::Index, Heights::range(start, end)))
}
