//! Per-height and per-boundary derived records.

use super::{Record, ValidationError};
use crate::perbill::Perbill;
use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use num_traits::Signed;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSeq {
    pub height: u64,
    pub time: DateTime<Utc>,
    pub session: u64,
    pub era: u64,
    pub hash: String,
    pub parent_hash: String,
    pub author: Option<String>,
    pub extrinsics_count: u32,
    pub signed_extrinsics_count: u32,
}

impl Record for BlockSeq {
    const TABLE: &'static str = "block_sequences";

    fn natural_key(&self) -> String {
        self.height.to_string()
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.hash.is_empty() {
            return Err(self.invalid("empty block hash"));
        }
        if self.signed_extrinsics_count > self.extrinsics_count {
            return Err(self.invalid("more signed extrinsics than extrinsics"));
        }
        Ok(())
    }

    fn update(&mut self, other: &Self) {
        self.time = other.time;
        self.session = other.session;
        self.era = other.era;
        self.hash = other.hash.clone();
        self.parent_hash = other.parent_hash.clone();
        self.author = other.author.clone();
        self.extrinsics_count = other.extrinsics_count;
        self.signed_extrinsics_count = other.signed_extrinsics_count;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSeq {
    pub height: u64,
    pub index: u32,
    pub time: DateTime<Utc>,
    pub hash: String,
    pub section: String,
    pub method: String,
    pub signer: Option<String>,
    pub success: bool,
}

impl TransactionSeq {
    /// `section.method`, the value transaction-kind filters match against.
    pub fn kind_name(&self) -> String {
        format!("{}.{}", self.section, self.method)
    }
}

impl Record for TransactionSeq {
    const TABLE: &'static str = "transaction_sequences";

    fn natural_key(&self) -> String {
        format!("{}-{}", self.height, self.index)
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn kind(&self) -> Option<String> {
        Some(self.kind_name())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.section.is_empty() || self.method.is_empty() {
            return Err(self.invalid("missing section or method"));
        }
        Ok(())
    }

    fn update(&mut self, other: &Self) {
        self.time = other.time;
        self.hash = other.hash.clone();
        self.section = other.section.clone();
        self.method = other.method.clone();
        self.signer = other.signer.clone();
        self.success = other.success;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSeq {
    pub height: u64,
    pub time: DateTime<Utc>,
    pub session: u64,
    pub era: u64,
    pub stash: String,
    pub controller: Option<String>,
    #[serde(with = "crate::amount")]
    pub active_balance: BigInt,
    #[serde(with = "crate::amount")]
    pub total_stake: BigInt,
    pub stakers_count: u32,
    pub commission: Perbill,
    pub online: bool,
    pub blocks_authored: u32,
}

impl Record for ValidatorSeq {
    const TABLE: &'static str = "validator_sequences";

    fn natural_key(&self) -> String {
        format!("{}-{}", self.height, self.stash)
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.stash.is_empty() {
            return Err(self.invalid("empty stash"));
        }
        if self.active_balance.is_negative() || self.total_stake.is_negative() {
            return Err(self.invalid("negative stake"));
        }
        Ok(())
    }

    fn update(&mut self, other: &Self) {
        self.time = other.time;
        self.session = other.session;
        self.era = other.era;
        self.controller = other.controller.clone();
        self.active_balance = other.active_balance.clone();
        self.total_stake = other.total_stake.clone();
        self.stakers_count = other.stakers_count;
        self.commission = other.commission;
        self.online = other.online;
        self.blocks_authored = other.blocks_authored;
    }
}

/// Computed at the last height of a session only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSessionSeq {
    pub session: u64,
    pub stash: String,
    pub height: u64,
    pub era: u64,
    #[serde(with = "crate::amount")]
    pub active_balance: BigInt,
    pub online: bool,
    pub blocks_authored: u32,
}

impl Record for ValidatorSessionSeq {
    const TABLE: &'static str = "validator_session_sequences";

    fn natural_key(&self) -> String {
        format!("{}-{}", self.session, self.stash)
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn update(&mut self, other: &Self) {
        self.height = other.height;
        self.era = other.era;
        self.active_balance = other.active_balance.clone();
        self.online = other.online;
        self.blocks_authored = other.blocks_authored;
    }
}

/// Reward split of one validator for one era. Computed at the last height of the era.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorEraSeq {
    pub era: u64,
    pub stash: String,
    pub height: u64,
    pub reward_points: u64,
    pub total_reward_points: u64,
    pub commission: Perbill,
    pub reward_part: Perbill,
    #[serde(with = "crate::amount")]
    pub total_payout: BigInt,
    #[serde(with = "crate::amount")]
    pub commission_payout: BigInt,
    #[serde(with = "crate::amount")]
    pub leftover_payout: BigInt,
    #[serde(with = "crate::amount")]
    pub validator_reward: BigInt,
    #[serde(with = "crate::amount")]
    pub own_stake: BigInt,
    #[serde(with = "crate::amount")]
    pub total_stake: BigInt,
}

impl Record for ValidatorEraSeq {
    const TABLE: &'static str = "validator_era_sequences";

    fn natural_key(&self) -> String {
        format!("{}-{}", self.era, self.stash)
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.reward_points > self.total_reward_points {
            return Err(self.invalid("reward points exceed era total"));
        }
        if self.commission_payout > self.total_payout {
            return Err(self.invalid("commission exceeds payout"));
        }
        if self.own_stake > self.total_stake {
            return Err(self.invalid("own stake exceeds total stake"));
        }
        Ok(())
    }

    fn update(&mut self, other: &Self) {
        self.height = other.height;
        self.reward_points = other.reward_points;
        self.total_reward_points = other.total_reward_points;
        self.commission = other.commission;
        self.reward_part = other.reward_part;
        self.total_payout = other.total_payout.clone();
        self.commission_payout = other.commission_payout.clone();
        self.leftover_payout = other.leftover_payout.clone();
        self.validator_reward = other.validator_reward.clone();
        self.own_stake = other.own_stake.clone();
        self.total_stake = other.total_stake.clone();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSeq {
    pub height: u64,
    pub index: u32,
    pub time: DateTime<Utc>,
    pub section: String,
    pub method: String,
    pub extrinsic_index: Option<u32>,
    pub data: serde_json::Value,
}

impl Record for EventSeq {
    const TABLE: &'static str = "event_sequences";

    fn natural_key(&self) -> String {
        format!("{}-{}", self.height, self.index)
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn kind(&self) -> Option<String> {
        Some(format!("{}.{}", self.section, self.method))
    }

    fn update(&mut self, other: &Self) {
        self.time = other.time;
        self.section = other.section.clone();
        self.method = other.method.clone();
        self.extrinsic_index = other.extrinsic_index;
        self.data = other.data.clone();
    }
}

/// A nominator's (or the validator's own) stake and reward behind one validator for one era.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEraSeq {
    pub era: u64,
    pub stash: String,
    pub validator_stash: String,
    pub height: u64,
    #[serde(with = "crate::amount")]
    pub stake: BigInt,
    #[serde(with = "crate::amount")]
    pub reward: BigInt,
}

impl Record for AccountEraSeq {
    const TABLE: &'static str = "account_era_sequences";

    fn natural_key(&self) -> String {
        format!("{}-{}-{}", self.era, self.stash, self.validator_stash)
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.stake.is_negative() || self.reward.is_negative() {
            return Err(self.invalid("negative stake or reward"));
        }
        Ok(())
    }

    fn update(&mut self, other: &Self) {
        self.height = other.height;
        self.stake = other.stake.clone();
        self.reward = other.reward.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(height: u64, stash: &str, balance: i64) -> ValidatorSeq {
        ValidatorSeq {
            height,
            time: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            session: 1,
            era: 1,
            stash: stash.to_string(),
            controller: None,
            active_balance: BigInt::from(balance),
            total_stake: BigInt::from(balance),
            stakers_count: 0,
            commission: Perbill::ZERO,
            online: true,
            blocks_authored: 0,
        }
    }

    #[test]
    fn natural_keys() {
        assert_eq!(validator(5, "alice", 1).natural_key(), "5-alice");
        let account = AccountEraSeq {
            era: 3,
            stash: "bob".into(),
            validator_stash: "alice".into(),
            height: 99,
            stake: BigInt::from(1),
            reward: BigInt::from(0),
        };
        assert_eq!(account.natural_key(), "3-bob-alice");
    }

    #[test]
    fn update_keeps_key_fields() {
        let mut stored = validator(5, "alice", 10);
        let recomputed = validator(5, "alice", 20);
        stored.update(&recomputed);
        assert_eq!(stored, recomputed);
        assert_eq!(stored.natural_key(), "5-alice");
    }

    #[test]
    fn validation_rejects_negative_stake() {
        let err = validator(5, "alice", -1).validate().unwrap_err();
        assert_eq!(err.record, "validator_sequences");
        assert_eq!(err.key, "5-alice");
        assert!(validator(5, "", 1).validate().is_err());
    }

    #[test]
    fn transaction_kind_is_section_dot_method() {
        let tx = TransactionSeq {
            height: 1,
            index: 0,
            time: DateTime::from_timestamp(0, 0).unwrap(),
            hash: "0x01".into(),
            section: "staking".into(),
            method: "bond".into(),
            signer: Some("alice".into()),
            success: true,
        };
        assert_eq!(tx.kind().as_deref(), Some("staking.bond"));
        assert_eq!(tx.natural_key(), "1-0");
    }
}
