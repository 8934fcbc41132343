//! Chain proxy client: raw per-height data the fetch tasks pull.

pub mod cache;
pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use index_pipeline::TaskError;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chain metadata of one height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightMeta {
    pub height: u64,
    pub time: DateTime<Utc>,
    pub chain: String,
    pub spec_version: u32,
    pub session: u64,
    pub era: u64,
    pub active_era: u64,
    pub last_in_session: bool,
    pub last_in_era: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawExtrinsic {
    pub index: u32,
    pub hash: String,
    pub section: String,
    pub method: String,
    #[serde(default)]
    pub signer: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBlock {
    pub height: u64,
    pub hash: String,
    pub parent_hash: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub extrinsics: Vec<RawExtrinsic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStake {
    pub account: String,
    #[serde(with = "crate::amount")]
    pub stake: BigInt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStakingValidator {
    pub stash: String,
    #[serde(default)]
    pub controller: Option<String>,
    #[serde(with = "crate::amount")]
    pub active_balance: BigInt,
    /// Commission in parts per billion.
    pub commission: i64,
    pub reward_points: u64,
    #[serde(with = "crate::amount")]
    pub total_stake: BigInt,
    #[serde(with = "crate::amount")]
    pub own_stake: BigInt,
    #[serde(default)]
    pub stakers: Vec<RawStake>,
}

/// Staking snapshot at one height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStaking {
    pub height: u64,
    pub era: u64,
    pub total_reward_points: u64,
    /// Total validator payout of the era.
    #[serde(with = "crate::amount")]
    pub total_payout: BigInt,
    pub validators: Vec<RawStakingValidator>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawValidatorPerformance {
    pub stash: String,
    pub online: bool,
    pub blocks_authored: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPerformance {
    pub height: u64,
    pub session: u64,
    pub validators: Vec<RawValidatorPerformance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub index: u32,
    pub section: String,
    pub method: String,
    #[serde(default)]
    pub extrinsic_index: Option<u32>,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("cannot decode response: {0}")]
    Decode(String),

    #[error("height {0} not available")]
    NotFound(u64),
}

impl RpcError {
    /// Transport failures and timeouts are retried. Server errors are retried when their
    /// message looks like overload or a dropped connection.
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::Transport(_) | RpcError::Timeout => true,
            RpcError::Rpc { code, message } => {
                let msg = message.to_lowercase();
                *code == -32005
                    || *code == 429
                    || msg.contains("rate limit")
                    || msg.contains("too many requests")
                    || msg.contains("timeout")
                    || msg.contains("connection")
                    || msg.contains("temporarily unavailable")
                    || msg.contains("503")
                    || msg.contains("502")
            }
            RpcError::Decode(_) | RpcError::NotFound(_) => false,
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RpcError::Timeout
        } else if e.is_decode() {
            RpcError::Decode(e.to_string())
        } else {
            RpcError::Transport(e.to_string())
        }
    }
}

impl From<RpcError> for TaskError {
    fn from(e: RpcError) -> Self {
        if e.is_transient() {
            TaskError::transient(e)
        } else {
            TaskError::fatal(e)
        }
    }
}

/// Upstream chain proxy.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Metadata of the current chain head.
    async fn head(&self) -> Result<HeightMeta, RpcError>;

    async fn height_meta(&self, height: u64) -> Result<HeightMeta, RpcError>;

    async fn block(&self, height: u64) -> Result<RawBlock, RpcError>;

    async fn staking(&self, height: u64) -> Result<RawStaking, RpcError>;

    async fn validator_performance(&self, height: u64) -> Result<RawPerformance, RpcError>;

    async fn events(&self, height: u64) -> Result<Vec<RawEvent>, RpcError>;
}
