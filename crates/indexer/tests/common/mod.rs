//! Common helpers for integration tests.
//! Some helpers are only used by specific test binaries; allow dead_code to avoid per-binary warnings.
#![allow(dead_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use chain_indexer::chain::{
    HeightMeta, RawBlock, RawEvent, RawExtrinsic, RawPerformance, RawStake, RawStaking,
    RawStakingValidator, RawValidatorPerformance,
};
use chain_indexer::{ChainClient, IndexerConfig, IndexingPipeline, MemoryStore, RpcError, TargetsReader};
use chrono::DateTime;
use index_pipeline::RetryConfig;
use num_bigint::BigInt;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Sessions are 10 heights long and eras 100.
pub fn meta(height: u64) -> HeightMeta {
    HeightMeta {
        height,
        time: DateTime::from_timestamp(1_700_000_000 + height as i64 * 6, 0).unwrap_or_default(),
        chain: "testnet".into(),
        spec_version: 9,
        session: height / 10,
        era: height / 100,
        active_era: height / 100,
        last_in_session: height % 10 == 9,
        last_in_era: height % 100 == 99,
    }
}

/// Deterministic chain. Alice's active balance jumps by 20% at height 15 and bob leaves the
/// validator set at height 18. Heights divisible by 7 carry a `staking.bond` transaction.
pub struct FakeChain {
    head: AtomicU64,
    block_calls: AtomicU64,
    transient_block_failures: AtomicU32,
    fatal_heights: Mutex<HashSet<u64>>,
}

impl FakeChain {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            block_calls: AtomicU64::new(0),
            transient_block_failures: AtomicU32::new(0),
            fatal_heights: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// The next `n` block requests fail with a transport error.
    pub fn fail_blocks_transiently(&self, n: u32) {
        self.transient_block_failures.store(n, Ordering::SeqCst);
    }

    /// Block requests for `height` fail permanently.
    pub fn fail_block_at(&self, height: u64) {
        self.fatal_heights.lock().unwrap_or_else(|e| e.into_inner()).insert(height);
    }

    pub fn block_calls(&self) -> u64 {
        self.block_calls.load(Ordering::SeqCst)
    }

    fn check_height(&self, height: u64) -> Result<(), RpcError> {
        if height > self.head.load(Ordering::SeqCst) || height == 0 {
            return Err(RpcError::NotFound(height));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn head(&self) -> Result<HeightMeta, RpcError> {
        Ok(meta(self.head.load(Ordering::SeqCst)))
    }

    async fn height_meta(&self, height: u64) -> Result<HeightMeta, RpcError> {
        self.check_height(height)?;
        Ok(meta(height))
    }

    async fn block(&self, height: u64) -> Result<RawBlock, RpcError> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        self.check_height(height)?;
        let failing = self
            .transient_block_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RpcError::Transport("connection reset by peer".into()));
        }
        if self.fatal_heights.lock().unwrap_or_else(|e| e.into_inner()).contains(&height) {
            return Err(RpcError::Decode(format!("corrupt block {height}")));
        }

        let mut extrinsics = vec![RawExtrinsic {
            index: 0,
            hash: format!("0xa{height}"),
            section: "timestamp".into(),
            method: "set".into(),
            signer: None,
            success: true,
        }];
        if height % 7 == 0 {
            extrinsics.push(RawExtrinsic {
                index: 1,
                hash: format!("0xb{height}"),
                section: "staking".into(),
                method: "bond".into(),
                signer: Some("nominator".into()),
                success: true,
            });
        }
        Ok(RawBlock {
            height,
            hash: format!("0x{height:064x}"),
            parent_hash: format!("0x{:064x}", height - 1),
            time: meta(height).time,
            author: Some("alice".into()),
            extrinsics,
        })
    }

    async fn staking(&self, height: u64) -> Result<RawStaking, RpcError> {
        self.check_height(height)?;
        let alice_balance = if height >= 15 { 1_200 } else { 1_000 };
        let mut validators = vec![RawStakingValidator {
            stash: "alice".into(),
            controller: None,
            active_balance: BigInt::from(alice_balance),
            commission: 100_000_000,
            reward_points: 60,
            total_stake: BigInt::from(4_000),
            own_stake: BigInt::from(1_000),
            stakers: vec![RawStake {
                account: "nominator".into(),
                stake: BigInt::from(3_000),
            }],
        }];
        if height < 18 {
            validators.push(RawStakingValidator {
                stash: "bob".into(),
                controller: Some("bob-ctrl".into()),
                active_balance: BigInt::from(2_000),
                commission: 0,
                reward_points: 40,
                total_stake: BigInt::from(2_000),
                own_stake: BigInt::from(2_000),
                stakers: vec![],
            });
        }
        Ok(RawStaking {
            height,
            era: height / 100,
            total_reward_points: 100,
            total_payout: BigInt::from(1_000_000),
            validators,
        })
    }

    async fn validator_performance(&self, height: u64) -> Result<RawPerformance, RpcError> {
        self.check_height(height)?;
        Ok(RawPerformance {
            height,
            session: height / 10,
            validators: vec![
                RawValidatorPerformance {
                    stash: "alice".into(),
                    online: true,
                    blocks_authored: 1,
                },
                RawValidatorPerformance {
                    stash: "bob".into(),
                    online: height % 2 == 0,
                    blocks_authored: 0,
                },
            ],
        })
    }

    async fn events(&self, height: u64) -> Result<Vec<RawEvent>, RpcError> {
        self.check_height(height)?;
        Ok(vec![RawEvent {
            index: 0,
            section: "system".into(),
            method: "ExtrinsicSuccess".into(),
            extrinsic_index: Some(0),
            data: serde_json::json!([]),
        }])
    }
}

/// The catalog shipped in `config/targets.json` (versions 1..=3, current 3).
pub fn shipped_catalog() -> Result<TargetsReader> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/targets.json");
    TargetsReader::load(&path).with_context(|| format!("load {}", path.display()))
}

pub fn test_config() -> IndexerConfig {
    IndexerConfig {
        first_block_height: 1,
        default_batch_size: 0,
        retry: RetryConfig::immediate(3),
        ..Default::default()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub chain: Arc<FakeChain>,
    pub indexer: IndexingPipeline,
}

pub fn harness_with(head: u64, targets: TargetsReader) -> Result<Harness> {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let chain = Arc::new(FakeChain::new(head));
    let indexer = IndexingPipeline::new(test_config(), store.clone(), chain.clone(), targets)
        .context("build indexer")?;
    Ok(Harness {
        store,
        chain,
        indexer,
    })
}

/// In-memory indexer over the shipped catalog with the chain head at `head`.
pub fn harness(head: u64) -> Result<Harness> {
    harness_with(head, shipped_catalog()?)
}
