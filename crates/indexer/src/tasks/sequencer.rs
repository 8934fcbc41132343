//! Sequence creators. Each computes one record type for the height and splits the result
//! into new and updated records against the store.

use super::split_changes;
use crate::model::{
    AccountEraSeq, BlockSeq, EventSeq, TransactionSeq, ValidatorEraSeq, ValidatorSeq,
    ValidatorSessionSeq,
};
use crate::payload::{IndexPayload, ParsedBlock, ParsedValidators, PayloadUpdate, TaskId};
use crate::perbill::EraPayout;
use crate::source::BoundaryFilter;
use crate::store::Store;
use async_trait::async_trait;
use index_pipeline::{Task, TaskError};
use std::sync::Arc;

fn parsed_block(payload: &IndexPayload) -> Result<&ParsedBlock, TaskError> {
    payload
        .parsed_block
        .as_ref()
        .ok_or(TaskError::MissingInput("parsed block"))
}

fn parsed_validators(payload: &IndexPayload) -> Result<&ParsedValidators, TaskError> {
    payload
        .parsed_validators
        .as_ref()
        .ok_or(TaskError::MissingInput("parsed validators"))
}

pub struct BlockSeqCreator {
    store: Arc<dyn Store>,
}

impl BlockSeqCreator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task<IndexPayload> for BlockSeqCreator {
    fn id(&self) -> TaskId {
        TaskId::BlockSeqCreator
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let meta = payload.require_meta()?;
        let block = parsed_block(payload)?;
        let record = BlockSeq {
            height: payload.height,
            time: block.time,
            session: meta.session,
            era: meta.era,
            hash: block.hash.clone(),
            parent_hash: block.parent_hash.clone(),
            author: block.author.clone(),
            extrinsics_count: block.transactions.len() as u32,
            signed_extrinsics_count: block.signed_count(),
        };
        let changes = split_changes(self.store.as_ref(), vec![record]).await?;
        Ok(vec![PayloadUpdate::BlockSequences(changes)])
    }
}

pub struct TransactionSeqCreator {
    store: Arc<dyn Store>,
}

impl TransactionSeqCreator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task<IndexPayload> for TransactionSeqCreator {
    fn id(&self) -> TaskId {
        TaskId::TransactionSeqCreator
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let block = parsed_block(payload)?;
        let records = block
            .transactions
            .iter()
            .map(|tx| TransactionSeq {
                height: payload.height,
                index: tx.index,
                time: block.time,
                hash: tx.hash.clone(),
                section: tx.section.clone(),
                method: tx.method.clone(),
                signer: tx.signer.clone(),
                success: tx.success,
            })
            .collect();
        let changes = split_changes(self.store.as_ref(), records).await?;
        Ok(vec![PayloadUpdate::TransactionSequences(changes)])
    }
}

pub struct ValidatorSeqCreator {
    store: Arc<dyn Store>,
}

impl ValidatorSeqCreator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task<IndexPayload> for ValidatorSeqCreator {
    fn id(&self) -> TaskId {
        TaskId::ValidatorSeqCreator
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let meta = payload.require_meta()?;
        let validators = parsed_validators(payload)?;
        let records = validators
            .by_stash
            .values()
            .map(|v| ValidatorSeq {
                height: payload.height,
                time: meta.time,
                session: meta.session,
                era: meta.era,
                stash: v.stash.clone(),
                controller: v.controller.clone(),
                active_balance: v.active_balance.clone(),
                total_stake: v.total_stake.clone(),
                stakers_count: v.stakers.len() as u32,
                commission: v.commission,
                online: v.online,
                blocks_authored: v.blocks_authored,
            })
            .collect();
        let changes = split_changes(self.store.as_ref(), records).await?;
        Ok(vec![PayloadUpdate::ValidatorSequences(changes)])
    }
}

/// Runs at session boundaries only.
pub struct ValidatorSessionSeqCreator {
    store: Arc<dyn Store>,
}

impl ValidatorSessionSeqCreator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task<IndexPayload> for ValidatorSessionSeqCreator {
    fn id(&self) -> TaskId {
        TaskId::ValidatorSessionSeqCreator
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let meta = payload.require_meta()?;
        if !BoundaryFilter::LastInSession.matches(meta.last_in_session, meta.last_in_era) {
            return Ok(Vec::new());
        }
        let validators = parsed_validators(payload)?;
        let records = validators
            .by_stash
            .values()
            .map(|v| ValidatorSessionSeq {
                session: meta.session,
                stash: v.stash.clone(),
                height: payload.height,
                era: meta.era,
                active_balance: v.active_balance.clone(),
                online: v.online,
                blocks_authored: v.blocks_authored,
            })
            .collect();
        let changes = split_changes(self.store.as_ref(), records).await?;
        Ok(vec![PayloadUpdate::ValidatorSessionSequences(changes)])
    }
}

/// Splits the era payout per validator. Runs at era boundaries only.
pub struct ValidatorEraSeqCreator {
    store: Arc<dyn Store>,
}

impl ValidatorEraSeqCreator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task<IndexPayload> for ValidatorEraSeqCreator {
    fn id(&self) -> TaskId {
        TaskId::ValidatorEraSeqCreator
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let meta = payload.require_meta()?;
        if !meta.last_in_era {
            return Ok(Vec::new());
        }
        let validators = parsed_validators(payload)?;
        let records = validators
            .by_stash
            .values()
            .map(|v| {
                let payout = EraPayout::compute(
                    v.reward_points,
                    validators.total_reward_points,
                    &validators.total_payout,
                    v.commission,
                );
                ValidatorEraSeq {
                    era: validators.era,
                    stash: v.stash.clone(),
                    height: payload.height,
                    reward_points: v.reward_points,
                    total_reward_points: validators.total_reward_points,
                    commission: v.commission,
                    reward_part: payout.total_reward_part,
                    validator_reward: payout.validator_reward(&v.own_stake, &v.total_stake),
                    total_payout: payout.total_payout,
                    commission_payout: payout.commission,
                    leftover_payout: payout.leftover_for_stakers,
                    own_stake: v.own_stake.clone(),
                    total_stake: v.total_stake.clone(),
                }
            })
            .collect();
        let changes = split_changes(self.store.as_ref(), records).await?;
        Ok(vec![PayloadUpdate::ValidatorEraSequences(changes)])
    }
}

pub struct EventSeqCreator {
    store: Arc<dyn Store>,
}

impl EventSeqCreator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task<IndexPayload> for EventSeqCreator {
    fn id(&self) -> TaskId {
        TaskId::EventSeqCreator
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let meta = payload.require_meta()?;
        let events = payload
            .raw_events
            .as_ref()
            .ok_or(TaskError::MissingInput("raw events"))?;
        let records = events
            .iter()
            .map(|e| EventSeq {
                height: payload.height,
                index: e.index,
                time: meta.time,
                section: e.section.clone(),
                method: e.method.clone(),
                extrinsic_index: e.extrinsic_index,
                data: e.data.clone(),
            })
            .collect();
        let changes = split_changes(self.store.as_ref(), records).await?;
        Ok(vec![PayloadUpdate::EventSequences(changes)])
    }
}

/// Stake and reward of every account behind every validator. Runs at era boundaries only.
pub struct AccountEraSeqCreator {
    store: Arc<dyn Store>,
}

impl AccountEraSeqCreator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task<IndexPayload> for AccountEraSeqCreator {
    fn id(&self) -> TaskId {
        TaskId::AccountEraSeqCreator
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let meta = payload.require_meta()?;
        if !meta.last_in_era {
            return Ok(Vec::new());
        }
        let validators = parsed_validators(payload)?;
        let mut records = Vec::new();
        for v in validators.by_stash.values() {
            let payout = EraPayout::compute(
                v.reward_points,
                validators.total_reward_points,
                &validators.total_payout,
                v.commission,
            );
            records.push(AccountEraSeq {
                era: validators.era,
                stash: v.stash.clone(),
                validator_stash: v.stash.clone(),
                height: payload.height,
                stake: v.own_stake.clone(),
                reward: payout.validator_reward(&v.own_stake, &v.total_stake),
            });
            for staker in v.stakers.iter().filter(|s| s.account != v.stash) {
                records.push(AccountEraSeq {
                    era: validators.era,
                    stash: staker.account.clone(),
                    validator_stash: v.stash.clone(),
                    height: payload.height,
                    stake: staker.stake.clone(),
                    reward: payout.staker_share(&staker.stake, &v.total_stake),
                });
            }
        }
        let changes = split_changes(self.store.as_ref(), records).await?;
        Ok(vec![PayloadUpdate::AccountEraSequences(changes)])
    }
}
