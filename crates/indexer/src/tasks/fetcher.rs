//! Raw data fetchers. They run concurrently and each owns one raw payload field.

use crate::chain::ChainClient;
use crate::payload::{IndexPayload, PayloadUpdate, TaskId};
use async_trait::async_trait;
use index_pipeline::{Task, TaskError};
use std::sync::Arc;

pub struct BlockFetcher {
    chain: Arc<dyn ChainClient>,
}

impl BlockFetcher {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl Task<IndexPayload> for BlockFetcher {
    fn id(&self) -> TaskId {
        TaskId::BlockFetcher
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let block = self.chain.block(payload.height).await?;
        tracing::trace!(height = payload.height, extrinsics = block.extrinsics.len(), "block fetched");
        Ok(vec![PayloadUpdate::RawBlock(block)])
    }
}

pub struct StakingFetcher {
    chain: Arc<dyn ChainClient>,
}

impl StakingFetcher {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl Task<IndexPayload> for StakingFetcher {
    fn id(&self) -> TaskId {
        TaskId::StakingFetcher
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let staking = self.chain.staking(payload.height).await?;
        Ok(vec![PayloadUpdate::RawStaking(staking)])
    }
}

pub struct ValidatorPerformanceFetcher {
    chain: Arc<dyn ChainClient>,
}

impl ValidatorPerformanceFetcher {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl Task<IndexPayload> for ValidatorPerformanceFetcher {
    fn id(&self) -> TaskId {
        TaskId::ValidatorPerformanceFetcher
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let performance = self.chain.validator_performance(payload.height).await?;
        Ok(vec![PayloadUpdate::RawPerformance(performance)])
    }
}

pub struct EventsFetcher {
    chain: Arc<dyn ChainClient>,
}

impl EventsFetcher {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl Task<IndexPayload> for EventsFetcher {
    fn id(&self) -> TaskId {
        TaskId::EventsFetcher
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let events = self.chain.events(payload.height).await?;
        Ok(vec![PayloadUpdate::RawEvents(events)])
    }
}
