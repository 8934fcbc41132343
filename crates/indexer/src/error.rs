//! Top-level indexer error.

use crate::chain::RpcError;
use crate::config::ConfigError;
use crate::source::SourceError;
use crate::store::StoreError;
use index_pipeline::{PipelineError, RunFailure};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Source(#[from] SourceError),

    /// An incompatible reindex report is still incomplete.
    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The run stopped on a failing height. The report was completed with the error.
    #[error("run for report {report_id} failed: {source}")]
    Run {
        report_id: i64,
        #[source]
        source: RunFailure,
    },
}

impl IndexerError {
    pub fn is_state_conflict(&self) -> bool {
        matches!(self, IndexerError::StateConflict(_))
    }
}
