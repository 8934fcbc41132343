use crate::chain::cache::MetaCache;
use crate::chain::ChainClient;
use crate::payload::{IndexPayload, PayloadUpdate, TaskId};
use async_trait::async_trait;
use index_pipeline::{Task, TaskError};
use std::sync::Arc;

/// Resolves chain metadata for the height through the run's cache.
pub struct HeightMetaRetriever {
    chain: Arc<dyn ChainClient>,
    cache: Arc<MetaCache>,
}

impl HeightMetaRetriever {
    pub fn new(chain: Arc<dyn ChainClient>, cache: Arc<MetaCache>) -> Self {
        Self { chain, cache }
    }
}

#[async_trait]
impl Task<IndexPayload> for HeightMetaRetriever {
    fn id(&self) -> TaskId {
        TaskId::HeightMetaRetriever
    }

    async fn run(&self, payload: &IndexPayload) -> Result<Vec<PayloadUpdate>, TaskError> {
        let meta = self.cache.get_or_fetch(payload.height, self.chain.as_ref()).await?;
        Ok(vec![PayloadUpdate::Meta(meta)])
    }
}
