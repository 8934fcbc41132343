//! Chain indexer: walks block heights, pulls raw data from a chain proxy, derives per-height
//! and per-era records and upserts them by natural key.
//!
//! - **IndexingPipeline**: owns the stage pipeline and exposes the run modes (forward index,
//!   backfill after an index-version bump, filtered reindex, dry run) and the report lifecycle
//!   that keeps reindex runs resumable and mutually exclusive.
//! - **TargetsReader**: versioned task catalog deciding which tasks run for a request.
//! - **Perbill**: parts-per-billion fixed point used to split era rewards.
//! - **system_events**: classifies active-balance changes between consecutive heights.

pub mod amount;
pub mod chain;
pub mod config;
pub mod error;
pub mod indexer;
pub mod model;
pub mod payload;
pub mod perbill;
pub mod report;
pub mod sink;
pub mod source;
pub mod store;
pub mod system_events;
pub mod targets;
pub mod tasks;
pub mod telemetry;

pub use chain::{cache::MetaCache, http::HttpChainClient, ChainClient, HeightMeta, RpcError};
pub use config::{ConfigError, IndexerConfig};
pub use error::IndexerError;
pub use indexer::{
    BackfillRequest, IndexRequest, IndexerStatus, IndexingPipeline, ReindexRequest, RunSummary,
};
pub use model::{Report, ReportKind, Syncable};
pub use payload::{IndexPayload, PayloadUpdate, TaskId};
pub use perbill::{EraPayout, Perbill};
pub use source::{BoundaryFilter, ChainSource, SourceError};
pub use store::{memory::MemoryStore, postgres::PgStore, Store, StoreError};
pub use targets::TargetsReader;
