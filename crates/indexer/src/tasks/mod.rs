//! Concrete tasks and the pipeline they form.
//!
//! | stage      | kind       | tasks |
//! |------------|------------|-------|
//! | setup      | sequential | height meta retriever |
//! | syncer     | sequential | main syncer |
//! | fetcher    | concurrent | block, staking, validator performance, events |
//! | parser     | sequential | block, validators |
//! | sequencer  | concurrent | one creator per sequence record |
//! | aggregator | sequential | validator aggregate creator |
//! | persistor  | concurrent | syncer plus one persistor per sequence/aggregate record |
//! | analyzer   | sequential | system event creator, then its persistor |

mod aggregator;
mod analyzer;
mod fetcher;
mod parser;
mod persistor;
mod sequencer;
mod setup;
mod syncer;

pub use aggregator::ValidatorAggCreator;
pub use analyzer::SystemEventCreator;
pub use fetcher::{BlockFetcher, EventsFetcher, StakingFetcher, ValidatorPerformanceFetcher};
pub use parser::{BlockParser, ValidatorsParser};
pub use persistor::{RecordPersistor, SyncerPersistor};
use persistor::Select;
pub use sequencer::{
    AccountEraSeqCreator, BlockSeqCreator, EventSeqCreator, TransactionSeqCreator,
    ValidatorEraSeqCreator, ValidatorSeqCreator, ValidatorSessionSeqCreator,
};
pub use setup::HeightMetaRetriever;
pub use syncer::MainSyncer;

use crate::chain::cache::MetaCache;
use crate::chain::ChainClient;
use crate::model::{
    AccountEraSeq, BlockSeq, Changes, EventSeq, Record, SystemEvent, TransactionSeq, ValidatorAgg,
    ValidatorEraSeq, ValidatorSeq, ValidatorSessionSeq,
};
use crate::payload::{IndexPayload, TaskId};
use crate::store::{RecordStoreExt, Store};
use index_pipeline::{
    Pipeline, PipelineError, RetryConfig, Retrying, Stage, StageKind, StageName, Task, TaskError,
};
use std::sync::Arc;

/// Shared handles every task may need.
#[derive(Clone)]
pub struct TaskContext {
    pub store: Arc<dyn Store>,
    pub chain: Arc<dyn ChainClient>,
    pub cache: Arc<MetaCache>,
    /// Version stamped on syncables created by this process.
    pub index_version: i64,
}

type BoxedTask = Box<dyn Task<IndexPayload>>;

fn plain<T: Task<IndexPayload> + 'static>(task: T) -> BoxedTask {
    Box::new(task)
}

fn retried<T: Task<IndexPayload> + 'static>(task: T, retry: &RetryConfig) -> BoxedTask {
    Box::new(Retrying::new(task, retry.clone()))
}

fn persisted<T: Record>(
    id: TaskId,
    store: &Arc<dyn Store>,
    select: Select<T>,
    retry: &RetryConfig,
) -> BoxedTask {
    retried(RecordPersistor::<T>::new(id, store.clone(), select), retry)
}

/// Stage `name` holding `tasks`. Fails if a task is declared for another stage.
fn staged(
    name: StageName,
    kind: StageKind,
    tasks: Vec<BoxedTask>,
) -> Result<Stage<IndexPayload>, PipelineError> {
    if let Some(task) = tasks.iter().find(|t| t.id().stage() != name) {
        return Err(PipelineError::Definition(format!(
            "task {} belongs to stage {}, not {name}",
            task.id(),
            task.id().stage()
        )));
    }
    Ok(match kind {
        StageKind::Sequential => Stage::sequential(name, tasks),
        StageKind::Concurrent => Stage::concurrent(name, tasks),
    })
}

/// Assemble every stage. Built once; runs select tasks through whitelists.
pub fn build_pipeline(
    ctx: &TaskContext,
    retry: &RetryConfig,
) -> Result<Pipeline<IndexPayload>, PipelineError> {
    let store = &ctx.store;
    let chain = &ctx.chain;

    Pipeline::builder()
        .stage(staged(
            StageName::Setup,
            StageKind::Sequential,
            vec![retried(HeightMetaRetriever::new(chain.clone(), ctx.cache.clone()), retry)],
        )?)
        .stage(staged(
            StageName::Syncer,
            StageKind::Sequential,
            vec![retried(MainSyncer::new(store.clone(), ctx.index_version), retry)],
        )?)
        .stage(staged(
            StageName::Fetcher,
            StageKind::Concurrent,
            vec![
                retried(BlockFetcher::new(chain.clone()), retry),
                retried(StakingFetcher::new(chain.clone()), retry),
                retried(ValidatorPerformanceFetcher::new(chain.clone()), retry),
                retried(EventsFetcher::new(chain.clone()), retry),
            ],
        )?)
        .stage(staged(
            StageName::Parser,
            StageKind::Sequential,
            vec![plain(BlockParser), plain(ValidatorsParser)],
        )?)
        .stage(staged(
            StageName::Sequencer,
            StageKind::Concurrent,
            vec![
                retried(BlockSeqCreator::new(store.clone()), retry),
                retried(TransactionSeqCreator::new(store.clone()), retry),
                retried(ValidatorSeqCreator::new(store.clone()), retry),
                retried(ValidatorSessionSeqCreator::new(store.clone()), retry),
                retried(ValidatorEraSeqCreator::new(store.clone()), retry),
                retried(EventSeqCreator::new(store.clone()), retry),
                retried(AccountEraSeqCreator::new(store.clone()), retry),
            ],
        )?)
        .stage(staged(
            StageName::Aggregator,
            StageKind::Sequential,
            vec![retried(ValidatorAggCreator::new(store.clone()), retry)],
        )?)
        .stage(staged(
            StageName::Persistor,
            StageKind::Concurrent,
            vec![
                retried(SyncerPersistor::new(store.clone()), retry),
                persisted::<BlockSeq>(
                    TaskId::BlockSeqPersistor,
                    store,
                    |p| p.block_sequences.as_ref(),
                    retry,
                ),
                persisted::<TransactionSeq>(
                    TaskId::TransactionSeqPersistor,
                    store,
                    |p| p.transaction_sequences.as_ref(),
                    retry,
                ),
                persisted::<ValidatorSeq>(
                    TaskId::ValidatorSeqPersistor,
                    store,
                    |p| p.validator_sequences.as_ref(),
                    retry,
                ),
                persisted::<ValidatorSessionSeq>(
                    TaskId::ValidatorSessionSeqPersistor,
                    store,
                    |p| p.validator_session_sequences.as_ref(),
                    retry,
                ),
                persisted::<ValidatorEraSeq>(
                    TaskId::ValidatorEraSeqPersistor,
                    store,
                    |p| p.validator_era_sequences.as_ref(),
                    retry,
                ),
                persisted::<EventSeq>(
                    TaskId::EventSeqPersistor,
                    store,
                    |p| p.event_sequences.as_ref(),
                    retry,
                ),
                persisted::<AccountEraSeq>(
                    TaskId::AccountEraSeqPersistor,
                    store,
                    |p| p.account_era_sequences.as_ref(),
                    retry,
                ),
                persisted::<ValidatorAgg>(
                    TaskId::ValidatorAggPersistor,
                    store,
                    |p| p.validator_aggregates.as_ref(),
                    retry,
                ),
            ],
        )?)
        .stage(staged(
            StageName::Analyzer,
            StageKind::Sequential,
            vec![
                retried(SystemEventCreator::new(store.clone()), retry),
                persisted::<SystemEvent>(
                    TaskId::SystemEventPersistor,
                    store,
                    |p| p.system_events.as_ref(),
                    retry,
                ),
            ],
        )?)
        .build()
}

/// Validate each record and split by whether its natural key is already stored. Existing
/// records get the recomputed fields merged in.
pub(crate) async fn split_changes<T: Record>(
    store: &dyn Store,
    records: Vec<T>,
) -> Result<Changes<T>, TaskError> {
    let mut changes = Changes::default();
    for record in records {
        record.validate()?;
        match store.find_by_key::<T>(&record.natural_key()).await? {
            Some(mut existing) => {
                existing.update(&record);
                changes.updated.push(existing);
            }
            None => changes.new.push(record),
        }
    }
    Ok(changes)
}
