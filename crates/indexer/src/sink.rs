//! Height finalization.

use crate::model::{SyncStatus, Syncable};
use crate::payload::IndexPayload;
use crate::store::{Store, StoreError, SyncableStore};
use async_trait::async_trait;
use chrono::Utc;
use index_pipeline::Sink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    /// The syncer did not run for this height (e.g. it was whitelisted out).
    #[error("no syncable produced for height {0}")]
    MissingSyncable(u64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// In-process counters over every height a sink finalized.
#[derive(Debug, Default)]
pub struct SinkMetrics {
    heights: AtomicU64,
    records: AtomicU64,
    elapsed_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkSnapshot {
    pub heights: u64,
    pub records: u64,
    pub elapsed_ms: u64,
}

impl SinkMetrics {
    fn record(&self, records: u64, elapsed_ms: u64) {
        self.heights.fetch_add(1, Ordering::Relaxed);
        self.records.fetch_add(records, Ordering::Relaxed);
        self.elapsed_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SinkSnapshot {
        SinkSnapshot {
            heights: self.heights.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            elapsed_ms: self.elapsed_ms.load(Ordering::Relaxed),
        }
    }
}

/// Marks each height processed under the run's report.
pub struct SyncableSink {
    store: Arc<dyn Store>,
    report_id: i64,
    /// Version stamped on processed heights. `None` keeps the stored one.
    index_version: Option<i64>,
    metrics: Arc<SinkMetrics>,
}

impl SyncableSink {
    pub fn new(
        store: Arc<dyn Store>,
        report_id: i64,
        index_version: Option<i64>,
        metrics: Arc<SinkMetrics>,
    ) -> Self {
        Self {
            store,
            report_id,
            index_version,
            metrics,
        }
    }

    fn finalize(&self, mut syncable: Syncable) -> Syncable {
        syncable.processed_at = Some(Utc::now());
        syncable.status = SyncStatus::Processed;
        syncable.report_id = Some(self.report_id);
        if let Some(version) = self.index_version {
            syncable.index_version = version;
        }
        syncable
    }
}

#[async_trait]
impl Sink<IndexPayload> for SyncableSink {
    type Error = SinkError;

    async fn consume(&self, payload: &IndexPayload) -> Result<(), SinkError> {
        let syncable = payload
            .syncable
            .clone()
            .ok_or(SinkError::MissingSyncable(payload.height))?;
        let syncable = self.finalize(syncable);

        // The syncer persistor may have been blacklisted; create on first sight.
        match self.store.find_syncable(syncable.height).await? {
            Some(_) => self.store.save_syncable(&syncable).await?,
            None => self.store.create_syncable(&syncable).await?,
        }

        let records = payload.record_count() as u64;
        let elapsed_ms = payload.started.elapsed().as_millis() as u64;
        self.metrics.record(records, elapsed_ms);
        tracing::info!(
            height = payload.height,
            records,
            elapsed_ms,
            version = syncable.index_version,
            report_id = self.report_id,
            "height processed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PayloadUpdate;
    use crate::store::memory::MemoryStore;
    use crate::tasks::fixtures;
    use index_pipeline::Payload;

    #[tokio::test]
    async fn marks_height_processed() {
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(SinkMetrics::default());
        let sink = SyncableSink::new(store.clone(), 7, Some(3), metrics.clone());

        let mut payload = IndexPayload::for_height(12);
        payload.apply(PayloadUpdate::Syncable(Syncable::from_meta(&fixtures::meta(12), 1)));
        tokio_test::assert_ok!(sink.consume(&payload).await);

        let stored = store.find_syncable(12).await.unwrap().unwrap();
        assert!(stored.is_processed());
        assert_eq!(stored.status, SyncStatus::Processed);
        assert_eq!(stored.index_version, 3);
        assert_eq!(stored.report_id, Some(7));
        assert_eq!(metrics.snapshot().heights, 1);
    }

    #[tokio::test]
    async fn keeps_stored_version_when_unset() {
        let store = Arc::new(MemoryStore::new());
        let sink = SyncableSink::new(store.clone(), 1, None, Arc::default());
        let mut payload = IndexPayload::for_height(4);
        payload.apply(PayloadUpdate::Syncable(Syncable::from_meta(&fixtures::meta(4), 2)));
        sink.consume(&payload).await.unwrap();
        assert_eq!(store.find_syncable(4).await.unwrap().unwrap().index_version, 2);
    }

    #[tokio::test]
    async fn missing_syncable_fails_the_height() {
        let store = Arc::new(MemoryStore::new());
        let sink = SyncableSink::new(store, 1, None, Arc::default());
        let err = sink.consume(&IndexPayload::for_height(4)).await.unwrap_err();
        assert!(matches!(err, SinkError::MissingSyncable(4)));
    }
}
