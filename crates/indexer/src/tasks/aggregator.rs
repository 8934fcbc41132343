use super::split_changes;
use crate::model::ValidatorAgg;
use crate::payload::{IndexPayload, PayloadUpdate, TaskId};
use crate::store::{RecordStoreExt, Store};
use async_trait::async_trait;
use index_pipeline::{Task, TaskError};
use std::sync::Arc;

/// Folds the height's validators into their running aggregates.
pub struct ValidatorAggCreator {
    store: Arc<dyn Store>,
}

impl ValidatorAggCreator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task<IndexPayload> for ValidatorAggCreator {
    fn id(&self) -> TaskId {
        TaskId::ValidatorAggCreator
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let meta = payload.require_meta()?;
        let validators = payload
            .parsed_validators
            .as_ref()
            .ok_or(TaskError::MissingInput("parsed validators"))?;

        let mut aggregates = Vec::with_capacity(validators.by_stash.len());
        for v in validators.by_stash.values() {
            let next = match self.store.find_by_key::<ValidatorAgg>(&v.stash).await? {
                Some(stored) => stored.observe(
                    payload.height,
                    meta.time,
                    v.active_balance.clone(),
                    v.commission,
                    v.online,
                ),
                None => ValidatorAgg::first_seen(
                    &v.stash,
                    payload.height,
                    meta.time,
                    v.active_balance.clone(),
                    v.commission,
                    v.online,
                ),
            };
            aggregates.push(next);
        }

        let changes = split_changes(self.store.as_ref(), aggregates).await?;
        Ok(vec![PayloadUpdate::ValidatorAggregates(changes)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::tasks::fixtures;
    use crate::tasks::parser::ValidatorsParser;
    use index_pipeline::Payload;

    async fn payload(height: u64) -> IndexPayload {
        let mut payload = IndexPayload::for_height(height);
        payload.apply(PayloadUpdate::Meta(fixtures::meta(height)));
        payload.apply(PayloadUpdate::RawStaking(fixtures::staking(height, 1_000)));
        payload.apply(PayloadUpdate::RawPerformance(fixtures::performance(height)));
        for update in ValidatorsParser.run(&payload).await.unwrap() {
            payload.apply(update);
        }
        payload
    }

    async fn aggregates(task: &ValidatorAggCreator, height: u64) -> crate::model::Changes<ValidatorAgg> {
        match task.run(&payload(height).await).await.unwrap().into_iter().next() {
            Some(PayloadUpdate::ValidatorAggregates(changes)) => changes,
            other => panic!("unexpected update {other:?}"),
        }
    }

    #[tokio::test]
    async fn aggregates_accumulate_across_heights() {
        let store = Arc::new(MemoryStore::new());
        let task = ValidatorAggCreator::new(store.clone());

        let first = aggregates(&task, 10).await;
        assert_eq!(first.new.len(), 2);
        for agg in first.iter() {
            store.create(agg).await.unwrap();
        }

        let second = aggregates(&task, 11).await;
        assert!(second.new.is_empty());
        let alice = second.updated.iter().find(|a| a.stash == "alice").unwrap();
        assert_eq!(alice.started_at_height, 10);
        assert_eq!(alice.recent_as_validator_height, 11);
        assert_eq!(alice.accumulated_uptime_count, 2);
        assert_eq!(alice.uptime_percent(), 100.0);

        let bob = second.updated.iter().find(|a| a.stash == "bob").unwrap();
        assert_eq!(bob.accumulated_uptime, 0);
    }

    #[tokio::test]
    async fn replaying_a_height_does_not_double_count() {
        let store = Arc::new(MemoryStore::new());
        let task = ValidatorAggCreator::new(store.clone());
        for agg in aggregates(&task, 10).await.iter() {
            store.create(agg).await.unwrap();
        }

        let replay = aggregates(&task, 10).await;
        let alice = replay.updated.iter().find(|a| a.stash == "alice").unwrap();
        assert_eq!(alice.accumulated_uptime_count, 1);
    }
}
