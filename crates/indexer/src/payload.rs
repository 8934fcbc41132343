//! Per-height payload, its updates and the task identities that produce them.

use crate::chain::{HeightMeta, RawBlock, RawEvent, RawPerformance, RawStake, RawStaking};
use crate::model::{
    AccountEraSeq, BlockSeq, Changes, EventSeq, Syncable, SystemEvent, TransactionSeq,
    ValidatorAgg, ValidatorEraSeq, ValidatorSeq, ValidatorSessionSeq,
};
use crate::perbill::Perbill;
use chrono::{DateTime, Utc};
use index_pipeline::{Payload, StageName, TaskError};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

macro_rules! task_ids {
    ($($stage:ident => [$($id:ident),+ $(,)?]),+ $(,)?) => {
        /// Every task the indexer can run. Catalog files name tasks by these identifiers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum TaskId {
            $($($id,)+)+
        }

        impl TaskId {
            pub const ALL: &'static [TaskId] = &[$($(TaskId::$id,)+)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($(TaskId::$id => stringify!($id),)+)+
                }
            }

            /// Stage the task belongs to.
            pub fn stage(&self) -> StageName {
                match self {
                    $($(TaskId::$id => StageName::$stage,)+)+
                }
            }
        }
    };
}

task_ids! {
    Setup => [HeightMetaRetriever],
    Syncer => [MainSyncer],
    Fetcher => [BlockFetcher, StakingFetcher, ValidatorPerformanceFetcher, EventsFetcher],
    Parser => [BlockParser, ValidatorsParser],
    Sequencer => [
        BlockSeqCreator,
        TransactionSeqCreator,
        ValidatorSeqCreator,
        ValidatorSessionSeqCreator,
        ValidatorEraSeqCreator,
        EventSeqCreator,
        AccountEraSeqCreator,
    ],
    Aggregator => [ValidatorAggCreator],
    Persistor => [
        SyncerPersistor,
        BlockSeqPersistor,
        TransactionSeqPersistor,
        ValidatorSeqPersistor,
        ValidatorSessionSeqPersistor,
        ValidatorEraSeqPersistor,
        EventSeqPersistor,
        AccountEraSeqPersistor,
        ValidatorAggPersistor,
    ],
    Analyzer => [SystemEventCreator, SystemEventPersistor],
}

impl TaskId {
    /// Tasks that write to the store. Dry runs exclude them.
    pub fn is_persistor(&self) -> bool {
        matches!(
            self,
            TaskId::SyncerPersistor
                | TaskId::BlockSeqPersistor
                | TaskId::TransactionSeqPersistor
                | TaskId::ValidatorSeqPersistor
                | TaskId::ValidatorSessionSeqPersistor
                | TaskId::ValidatorEraSeqPersistor
                | TaskId::EventSeqPersistor
                | TaskId::AccountEraSeqPersistor
                | TaskId::ValidatorAggPersistor
                | TaskId::SystemEventPersistor
        )
    }

    pub fn persistors() -> impl Iterator<Item = TaskId> {
        TaskId::ALL.iter().copied().filter(TaskId::is_persistor)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown task {s:?}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTransaction {
    pub index: u32,
    pub hash: String,
    pub section: String,
    pub method: String,
    pub signer: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBlock {
    pub hash: String,
    pub parent_hash: String,
    pub time: DateTime<Utc>,
    pub author: Option<String>,
    pub transactions: Vec<ParsedTransaction>,
}

impl ParsedBlock {
    pub fn signed_count(&self) -> u32 {
        self.transactions.iter().filter(|t| t.signer.is_some()).count() as u32
    }
}

/// Staking and performance data of one validator, joined by stash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedValidator {
    pub stash: String,
    pub controller: Option<String>,
    pub active_balance: BigInt,
    pub total_stake: BigInt,
    pub own_stake: BigInt,
    pub commission: Perbill,
    pub reward_points: u64,
    pub online: bool,
    pub blocks_authored: u32,
    pub stakers: Vec<RawStake>,
}

/// Validators at one height plus the era reward totals they were reported with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedValidators {
    pub era: u64,
    pub total_reward_points: u64,
    pub total_payout: BigInt,
    pub by_stash: BTreeMap<String, ParsedValidator>,
}

/// Working record for one height. Each field is written by exactly one task.
#[derive(Debug)]
pub struct IndexPayload {
    pub height: u64,
    pub started: Instant,

    pub meta: Option<HeightMeta>,
    pub syncable: Option<Syncable>,

    pub raw_block: Option<RawBlock>,
    pub raw_staking: Option<RawStaking>,
    pub raw_performance: Option<RawPerformance>,
    pub raw_events: Option<Vec<RawEvent>>,

    pub parsed_block: Option<ParsedBlock>,
    pub parsed_validators: Option<ParsedValidators>,

    pub block_sequences: Option<Changes<BlockSeq>>,
    pub transaction_sequences: Option<Changes<TransactionSeq>>,
    pub validator_sequences: Option<Changes<ValidatorSeq>>,
    pub validator_session_sequences: Option<Changes<ValidatorSessionSeq>>,
    pub validator_era_sequences: Option<Changes<ValidatorEraSeq>>,
    pub event_sequences: Option<Changes<EventSeq>>,
    pub account_era_sequences: Option<Changes<AccountEraSeq>>,

    pub validator_aggregates: Option<Changes<ValidatorAgg>>,

    pub system_events: Option<Changes<SystemEvent>>,
}

/// A write to one payload field.
#[derive(Debug)]
pub enum PayloadUpdate {
    Meta(HeightMeta),
    Syncable(Syncable),
    RawBlock(RawBlock),
    RawStaking(RawStaking),
    RawPerformance(RawPerformance),
    RawEvents(Vec<RawEvent>),
    ParsedBlock(ParsedBlock),
    ParsedValidators(ParsedValidators),
    BlockSequences(Changes<BlockSeq>),
    TransactionSequences(Changes<TransactionSeq>),
    ValidatorSequences(Changes<ValidatorSeq>),
    ValidatorSessionSequences(Changes<ValidatorSessionSeq>),
    ValidatorEraSequences(Changes<ValidatorEraSeq>),
    EventSequences(Changes<EventSeq>),
    AccountEraSequences(Changes<AccountEraSeq>),
    ValidatorAggregates(Changes<ValidatorAgg>),
    SystemEvents(Changes<SystemEvent>),
}

impl Payload for IndexPayload {
    type TaskId = TaskId;
    type Update = PayloadUpdate;

    fn for_height(height: u64) -> Self {
        Self {
            height,
            started: Instant::now(),
            meta: None,
            syncable: None,
            raw_block: None,
            raw_staking: None,
            raw_performance: None,
            raw_events: None,
            parsed_block: None,
            parsed_validators: None,
            block_sequences: None,
            transaction_sequences: None,
            validator_sequences: None,
            validator_session_sequences: None,
            validator_era_sequences: None,
            event_sequences: None,
            account_era_sequences: None,
            validator_aggregates: None,
            system_events: None,
        }
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn apply(&mut self, update: PayloadUpdate) {
        match update {
            PayloadUpdate::Meta(v) => self.meta = Some(v),
            PayloadUpdate::Syncable(v) => self.syncable = Some(v),
            PayloadUpdate::RawBlock(v) => self.raw_block = Some(v),
            PayloadUpdate::RawStaking(v) => self.raw_staking = Some(v),
            PayloadUpdate::RawPerformance(v) => self.raw_performance = Some(v),
            PayloadUpdate::RawEvents(v) => self.raw_events = Some(v),
            PayloadUpdate::ParsedBlock(v) => self.parsed_block = Some(v),
            PayloadUpdate::ParsedValidators(v) => self.parsed_validators = Some(v),
            PayloadUpdate::BlockSequences(v) => self.block_sequences = Some(v),
            PayloadUpdate::TransactionSequences(v) => self.transaction_sequences = Some(v),
            PayloadUpdate::ValidatorSequences(v) => self.validator_sequences = Some(v),
            PayloadUpdate::ValidatorSessionSequences(v) => self.validator_session_sequences = Some(v),
            PayloadUpdate::ValidatorEraSequences(v) => self.validator_era_sequences = Some(v),
            PayloadUpdate::EventSequences(v) => self.event_sequences = Some(v),
            PayloadUpdate::AccountEraSequences(v) => self.account_era_sequences = Some(v),
            PayloadUpdate::ValidatorAggregates(v) => self.validator_aggregates = Some(v),
            PayloadUpdate::SystemEvents(v) => self.system_events = Some(v),
        }
    }
}

impl IndexPayload {
    pub fn require_meta(&self) -> Result<&HeightMeta, TaskError> {
        self.meta.as_ref().ok_or(TaskError::MissingInput("height meta"))
    }

    /// Number of records computed for this height, used for sink metrics.
    pub fn record_count(&self) -> usize {
        fn len<T>(c: &Option<Changes<T>>) -> usize {
            c.as_ref().map(Changes::len).unwrap_or(0)
        }
        len(&self.block_sequences)
            + len(&self.transaction_sequences)
            + len(&self.validator_sequences)
            + len(&self.validator_session_sequences)
            + len(&self.validator_era_sequences)
            + len(&self.event_sequences)
            + len(&self.account_era_sequences)
            + len(&self.validator_aggregates)
            + len(&self.system_events)
    }
}
