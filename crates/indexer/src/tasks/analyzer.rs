use super::split_changes;
use crate::model::ValidatorSeq;
use crate::payload::{IndexPayload, PayloadUpdate, TaskId};
use crate::store::{RecordStoreExt, Store};
use crate::system_events::analyze;
use async_trait::async_trait;
use index_pipeline::{Task, TaskError};
use num_bigint::BigInt;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Compares the height's validator set with the previous height's stored one and derives
/// system events from the difference.
pub struct SystemEventCreator {
    store: Arc<dyn Store>,
}

impl SystemEventCreator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task<IndexPayload> for SystemEventCreator {
    fn id(&self) -> TaskId {
        TaskId::SystemEventCreator
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let meta = payload.require_meta()?;
        let validators = payload
            .validator_sequences
            .as_ref()
            .ok_or(TaskError::MissingInput("validator sequences"))?;
        let current: BTreeMap<String, BigInt> = validators
            .iter()
            .map(|v| (v.stash.clone(), v.active_balance.clone()))
            .collect();

        let previous: BTreeMap<String, BigInt> = match payload.height.checked_sub(1) {
            Some(prev) => self
                .store
                .find_by_height::<ValidatorSeq>(prev)
                .await?
                .into_iter()
                .map(|v| (v.stash, v.active_balance))
                .collect(),
            None => BTreeMap::new(),
        };

        let events = analyze(payload.height, meta.time, &previous, &current);
        if !events.is_empty() {
            tracing::debug!(height = payload.height, events = events.len(), "system events derived");
        }
        let changes = split_changes(self.store.as_ref(), events).await?;
        Ok(vec![PayloadUpdate::SystemEvents(changes)])
    }
}
