//! Writers. Persistors are the only tasks that mutate the store, so blacklisting all of them
//! turns a run into a dry run.

use crate::model::{Changes, Record};
use crate::payload::{IndexPayload, PayloadUpdate, TaskId};
use crate::store::{RecordStoreExt, Store, StoreError, SyncableStore};
use async_trait::async_trait;
use index_pipeline::{Task, TaskError};
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) type Select<T> = fn(&IndexPayload) -> Option<&Changes<T>>;

/// Persists one record type: inserts new records and saves updated ones.
pub struct RecordPersistor<T: Record> {
    id: TaskId,
    store: Arc<dyn Store>,
    select: Select<T>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> RecordPersistor<T> {
    pub fn new(id: TaskId, store: Arc<dyn Store>, select: Select<T>) -> Self {
        Self {
            id,
            store,
            select,
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Record> Task<IndexPayload> for RecordPersistor<T> {
    fn id(&self) -> TaskId {
        self.id
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        // Sequencers that skip a height leave nothing to write.
        let Some(changes) = (self.select)(payload) else {
            return Ok(Vec::new());
        };
        for record in &changes.new {
            match self.store.create(record).await {
                Ok(()) => {}
                // Written by an earlier attempt at this height.
                Err(StoreError::Duplicate { .. }) => self.store.save(record).await?,
                Err(e) => return Err(e.into()),
            }
        }
        for record in &changes.updated {
            self.store.save(record).await?;
        }
        if !changes.is_empty() {
            tracing::debug!(
                height = payload.height,
                table = T::TABLE,
                new = changes.new.len(),
                updated = changes.updated.len(),
                "records persisted"
            );
        }
        Ok(Vec::new())
    }
}

/// Writes the height's syncable.
pub struct SyncerPersistor {
    store: Arc<dyn Store>,
}

impl SyncerPersistor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task<IndexPayload> for SyncerPersistor {
    fn id(&self) -> TaskId {
        TaskId::SyncerPersistor
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let syncable = payload
            .syncable
            .as_ref()
            .ok_or(TaskError::MissingInput("syncable"))?;
        match self.store.find_syncable(syncable.height).await? {
            Some(_) => self.store.save_syncable(syncable).await?,
            None => self.store.create_syncable(syncable).await?,
        }
        Ok(Vec::new())
    }
}
