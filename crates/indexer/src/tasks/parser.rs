//! Normalizes raw chain data into the shapes the sequencers consume.

use crate::payload::{
    IndexPayload, ParsedBlock, ParsedTransaction, ParsedValidator, ParsedValidators, PayloadUpdate,
    TaskId,
};
use crate::perbill::Perbill;
use async_trait::async_trait;
use index_pipeline::{Task, TaskError};
use std::collections::{BTreeMap, HashMap};

pub struct BlockParser;

#[async_trait]
impl Task<IndexPayload> for BlockParser {
    fn id(&self) -> TaskId {
        TaskId::BlockParser
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let raw = payload.raw_block.as_ref().ok_or(TaskError::MissingInput("raw block"))?;
        if raw.height != payload.height {
            return Err(TaskError::Validation(format!(
                "block for height {} returned for height {}",
                raw.height, payload.height
            )));
        }

        let mut transactions: Vec<ParsedTransaction> = raw
            .extrinsics
            .iter()
            .map(|x| ParsedTransaction {
                index: x.index,
                hash: x.hash.clone(),
                section: x.section.trim().to_string(),
                method: x.method.trim().to_string(),
                signer: x.signer.clone().filter(|s| !s.is_empty()),
                success: x.success,
            })
            .collect();
        transactions.sort_by_key(|t| t.index);

        Ok(vec![PayloadUpdate::ParsedBlock(ParsedBlock {
            hash: raw.hash.clone(),
            parent_hash: raw.parent_hash.clone(),
            time: raw.time,
            author: raw.author.clone(),
            transactions,
        })])
    }
}

/// Joins the staking snapshot with validator performance by stash. Validators missing from
/// the performance snapshot count as offline.
pub struct ValidatorsParser;

#[async_trait]
impl Task<IndexPayload> for ValidatorsParser {
    fn id(&self) -> TaskId {
        TaskId::ValidatorsParser
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let staking = payload
            .raw_staking
            .as_ref()
            .ok_or(TaskError::MissingInput("raw staking"))?;
        let performance = payload
            .raw_performance
            .as_ref()
            .ok_or(TaskError::MissingInput("raw validator performance"))?;

        let by_stash: HashMap<&str, _> = performance
            .validators
            .iter()
            .map(|p| (p.stash.as_str(), p))
            .collect();

        let mut validators = BTreeMap::new();
        for v in &staking.validators {
            let perf = by_stash.get(v.stash.as_str());
            let parsed = ParsedValidator {
                stash: v.stash.clone(),
                controller: v.controller.clone(),
                active_balance: v.active_balance.clone(),
                total_stake: v.total_stake.clone(),
                own_stake: v.own_stake.clone(),
                commission: Perbill::from_parts(v.commission),
                reward_points: v.reward_points,
                online: perf.map(|p| p.online).unwrap_or(false),
                blocks_authored: perf.map(|p| p.blocks_authored).unwrap_or(0),
                stakers: v.stakers.clone(),
            };
            if validators.insert(v.stash.clone(), parsed).is_some() {
                return Err(TaskError::Validation(format!(
                    "validator {} listed twice at height {}",
                    v.stash, payload.height
                )));
            }
        }

        Ok(vec![PayloadUpdate::ParsedValidators(ParsedValidators {
            era: staking.era,
            total_reward_points: staking.total_reward_points,
            total_payout: staking.total_payout.clone(),
            by_stash: validators,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::fixtures;
    use index_pipeline::Payload;

    #[tokio::test]
    async fn block_parser_needs_raw_block() {
        let payload = IndexPayload::for_height(5);
        let err = BlockParser.run(&payload).await.unwrap_err();
        assert!(matches!(err, TaskError::MissingInput("raw block")));
    }

    #[tokio::test]
    async fn validators_are_joined_by_stash() {
        let mut payload = IndexPayload::for_height(5);
        payload.apply(PayloadUpdate::RawStaking(fixtures::staking(5, 1_000)));
        payload.apply(PayloadUpdate::RawPerformance(fixtures::performance(5)));

        let updates = ValidatorsParser.run(&payload).await.unwrap();
        let Some(PayloadUpdate::ParsedValidators(parsed)) = updates.into_iter().next() else {
            panic!("expected parsed validators");
        };
        assert_eq!(parsed.by_stash.len(), 2);
        assert!(parsed.by_stash["alice"].online);
        assert_eq!(parsed.by_stash["alice"].blocks_authored, 3);
        assert!(!parsed.by_stash["bob"].online);
        assert_eq!(parsed.by_stash["alice"].commission, Perbill::from_parts(100_000_000));
    }

    #[tokio::test]
    async fn mismatched_block_height_is_rejected() {
        let mut payload = IndexPayload::for_height(5);
        payload.apply(PayloadUpdate::RawBlock(fixtures::block(6)));
        assert!(matches!(
            BlockParser.run(&payload).await,
            Err(TaskError::Validation(_))
        ));
    }
}
