//! Height sources for the three run modes.

mod backfill;
mod index;
mod reindex;

pub use backfill::{backfill_source, scan_outdated, OutdatedRange};
pub use index::{index_source, IndexBounds};
pub use reindex::{reindex_source, ReindexFilter};

use crate::chain::RpcError;
use crate::store::StoreError;
use index_pipeline::{Heights, Source};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("nothing to process: next height {start} is past chain head {head}")]
    NothingToProcess { start: u64, head: u64 },

    #[error("nothing to backfill: every height is at index version {0}")]
    NothingToBackfill(i64),

    #[error("nothing to reindex")]
    NothingToReindex,

    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Restricts iteration to session or era boundary heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryFilter {
    /// Last height of a session. The last height of an era also ends a session.
    LastInSession,
    LastInEra,
}

impl BoundaryFilter {
    pub fn matches(&self, last_in_session: bool, last_in_era: bool) -> bool {
        match self {
            BoundaryFilter::LastInSession => last_in_session || last_in_era,
            BoundaryFilter::LastInEra => last_in_era,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Index,
    Backfill,
    Reindex,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Index => "index",
            Strategy::Backfill => "backfill",
            Strategy::Reindex => "reindex",
        })
    }
}

/// Heights resolved for one run.
#[derive(Debug, Clone)]
pub struct ChainSource {
    strategy: Strategy,
    heights: Heights,
}

impl ChainSource {
    pub fn new(strategy: Strategy, heights: Heights) -> Self {
        Self { strategy, heights }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn heights(&self) -> &Heights {
        &self.heights
    }
}

impl Source for ChainSource {
    fn start_height(&self) -> u64 {
        self.heights.start()
    }

    fn end_height(&self) -> u64 {
        self.heights.end()
    }

    fn next_height(&mut self) -> Option<u64> {
        self.heights.next_height()
    }

    fn len(&self) -> usize {
        self.heights.total()
    }
}
