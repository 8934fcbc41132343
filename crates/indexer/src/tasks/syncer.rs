use crate::model::Syncable;
use crate::payload::{IndexPayload, PayloadUpdate, TaskId};
use crate::store::{Store, SyncableStore};
use async_trait::async_trait;
use index_pipeline::{Task, TaskError};
use std::sync::Arc;

/// Loads the height's syncable, or starts a new one, and refreshes it from chain metadata.
/// Writing it back is left to [super::SyncerPersistor].
pub struct MainSyncer {
    store: Arc<dyn Store>,
    index_version: i64,
}

impl MainSyncer {
    pub fn new(store: Arc<dyn Store>, index_version: i64) -> Self {
        Self { store, index_version }
    }
}

#[async_trait]
impl Task<IndexPayload> for MainSyncer {
    fn id(&self) -> TaskId {
        TaskId::MainSyncer
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let meta = payload.require_meta()?;
        let syncable = match self.store.find_syncable(payload.height).await? {
            Some(mut existing) => {
                existing.apply_meta(meta);
                existing
            }
            None => Syncable::from_meta(meta, self.index_version),
        };
        Ok(vec![PayloadUpdate::Syncable(syncable)])
    }
}
