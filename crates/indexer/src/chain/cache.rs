//! Height → metadata cache shared by the tasks of one run.

use super::{ChainClient, HeightMeta, RpcError};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

/// Bounded FIFO cache. Access is serialized by one async mutex, held across the fetch so
/// concurrent tasks asking for the same height trigger a single request.
pub struct MetaCache {
    capacity: usize,
    inner: Mutex<Entries>,
}

#[derive(Default)]
struct Entries {
    map: HashMap<u64, HeightMeta>,
    order: VecDeque<u64>,
}

impl Entries {
    fn insert(&mut self, capacity: usize, meta: HeightMeta) {
        let height = meta.height;
        if self.map.insert(height, meta).is_none() {
            self.order.push_back(height);
        }
        while self.order.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            }
        }
    }
}

impl MetaCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Entries::default()),
        }
    }

    pub async fn get(&self, height: u64) -> Option<HeightMeta> {
        self.inner.lock().await.map.get(&height).cloned()
    }

    pub async fn insert(&self, meta: HeightMeta) {
        self.inner.lock().await.insert(self.capacity, meta);
    }

    pub async fn get_or_fetch(&self, height: u64, chain: &dyn ChainClient) -> Result<HeightMeta, RpcError> {
        let mut entries = self.inner.lock().await;
        if let Some(meta) = entries.map.get(&height) {
            return Ok(meta.clone());
        }
        let meta = chain.height_meta(height).await?;
        entries.insert(self.capacity, meta.clone());
        Ok(meta)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        let mut entries = self.inner.lock().await;
        entries.map.clear();
        entries.order.clear();
    }
}
