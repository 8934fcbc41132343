//! Persistence boundary.
//!
//! The pipeline depends only on these traits. Keyed records go through one JSON row API
//! ([RecordStore]); [RecordStoreExt] adds the typed find/create/save on top of it.

pub mod memory;
mod migrations;
pub mod postgres;

use crate::model::{Record, Report, ReportKind, Syncable, TransactionSeq};
use crate::source::BoundaryFilter;
use async_trait::async_trait;
use index_pipeline::TaskError;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("pool build error: {0}")]
    Build(#[from] deadpool_postgres::BuildError),

    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("{table} {key} already exists")]
    Duplicate { table: &'static str, key: String },

    #[error("{table} {key} not found")]
    NotFound { table: &'static str, key: String },

    #[error("cannot encode or decode record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Pool exhaustion, dropped connections, serialization failures and deadlocks.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Pool(_) => true,
            StoreError::Postgres(e) => match e.code() {
                Some(state) => {
                    let code = state.code();
                    code.starts_with("08") || code == "40001" || code == "40P01" || code == "57P01"
                }
                None => e.is_closed() || e.as_db_error().is_none(),
            },
            _ => false,
        }
    }
}

impl From<StoreError> for TaskError {
    fn from(e: StoreError) -> Self {
        if e.is_transient() {
            TaskError::transient(e)
        } else {
            TaskError::fatal(e)
        }
    }
}

/// One keyed record as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    pub key: String,
    pub height: u64,
    pub kind: Option<String>,
    pub data: Value,
}

#[async_trait]
pub trait SyncableStore: Send + Sync {
    async fn find_syncable(&self, height: u64) -> Result<Option<Syncable>, StoreError>;

    /// Highest stored height.
    async fn find_most_recent_syncable(&self) -> Result<Option<Syncable>, StoreError>;

    /// Lowest height whose index version differs from `version`.
    async fn find_first_with_other_version(&self, version: i64) -> Result<Option<Syncable>, StoreError>;

    /// Highest height whose index version differs from `version`.
    async fn find_last_with_other_version(&self, version: i64) -> Result<Option<Syncable>, StoreError>;

    /// Smallest index version stored other than `version`.
    async fn find_oldest_other_version(&self, version: i64) -> Result<Option<i64>, StoreError>;

    /// Stored heights in `[start, end]`, ascending.
    async fn find_syncable_heights(&self, start: u64, end: u64) -> Result<Vec<u64>, StoreError>;

    /// Stored session or era boundary heights in `[start, end]`, ascending.
    async fn find_boundary_heights(
        &self,
        start: u64,
        end: u64,
        filter: BoundaryFilter,
    ) -> Result<Vec<u64>, StoreError>;

    async fn create_syncable(&self, syncable: &Syncable) -> Result<(), StoreError>;

    async fn save_syncable(&self, syncable: &Syncable) -> Result<(), StoreError>;

    /// Stamp every height in `[start, end]` with `version`. Returns the number of rows touched.
    async fn set_index_version(&self, start: u64, end: u64, version: i64) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Insert and return the report with its assigned id.
    async fn create_report(&self, report: &Report) -> Result<Report, StoreError>;

    async fn save_report(&self, report: &Report) -> Result<(), StoreError>;

    async fn find_report(&self, id: i64) -> Result<Option<Report>, StoreError>;

    async fn find_incomplete_reports(&self, kinds: &[ReportKind]) -> Result<Vec<Report>, StoreError>;

    async fn delete_incomplete_reports(&self, kinds: &[ReportKind]) -> Result<u64, StoreError>;

    async fn find_most_recent_report(&self) -> Result<Option<Report>, StoreError>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_row(&self, table: &'static str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Fails with [StoreError::Duplicate] if the key exists.
    async fn insert_row(&self, table: &'static str, row: RecordRow) -> Result<(), StoreError>;

    /// Fails with [StoreError::NotFound] if the key does not exist.
    async fn update_row(&self, table: &'static str, row: RecordRow) -> Result<(), StoreError>;

    async fn rows_at_height(&self, table: &'static str, height: u64) -> Result<Vec<Value>, StoreError>;

    /// Distinct heights in `[start, end]` holding a row of any of `kinds`, ascending.
    async fn heights_with_kinds(
        &self,
        table: &'static str,
        kinds: &[String],
        start: u64,
        end: u64,
    ) -> Result<Vec<u64>, StoreError>;

    async fn count_rows(&self, table: &'static str) -> Result<u64, StoreError>;
}

fn to_row<T: Record>(record: &T) -> Result<RecordRow, StoreError> {
    Ok(RecordRow {
        key: record.natural_key(),
        height: record.height(),
        kind: record.kind(),
        data: serde_json::to_value(record)?,
    })
}

/// Typed access to keyed records.
#[async_trait]
pub trait RecordStoreExt: RecordStore {
    async fn find_by_key<T: Record>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.find_row(T::TABLE, key).await? {
            Some(data) => Ok(Some(serde_json::from_value(data)?)),
            None => Ok(None),
        }
    }

    async fn create<T: Record>(&self, record: &T) -> Result<(), StoreError> {
        self.insert_row(T::TABLE, to_row(record)?).await
    }

    async fn save<T: Record>(&self, record: &T) -> Result<(), StoreError> {
        self.update_row(T::TABLE, to_row(record)?).await
    }

    async fn find_by_height<T: Record>(&self, height: u64) -> Result<Vec<T>, StoreError> {
        self.rows_at_height(T::TABLE, height)
            .await?
            .into_iter()
            .map(|data| serde_json::from_value(data).map_err(StoreError::from))
            .collect()
    }

    /// Heights in `[start, end]` containing a transaction of any of `kinds` (`section.method`).
    async fn find_transaction_heights(
        &self,
        kinds: &[String],
        start: u64,
        end: u64,
    ) -> Result<Vec<u64>, StoreError> {
        self.heights_with_kinds(TransactionSeq::TABLE, kinds, start, end).await
    }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}

/// Everything the indexer needs from persistence.
pub trait Store: SyncableStore + ReportStore + RecordStore {}

impl<S: SyncableStore + ReportStore + RecordStore + ?Sized> Store for S {}
