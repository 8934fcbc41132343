//! Run modes over the one pipeline built at startup.

use crate::chain::cache::MetaCache;
use crate::chain::http::HttpChainClient;
use crate::chain::ChainClient;
use crate::config::IndexerConfig;
use crate::error::IndexerError;
use crate::model::{Report, ReportKind};
use crate::payload::{IndexPayload, TaskId};
use crate::report::{OpenReport, ReportCreator};
use crate::sink::{SinkMetrics, SinkSnapshot, SyncableSink};
use crate::source::{
    backfill_source, index_source, reindex_source, scan_outdated, BoundaryFilter, ChainSource,
    IndexBounds, ReindexFilter,
};
use crate::store::memory::MemoryStore;
use crate::store::postgres::PgStore;
use crate::store::{ReportStore, Store};
use crate::targets::TargetsReader;
use crate::tasks::{build_pipeline, TaskContext};
use index_pipeline::{Pipeline, RunOptions, RunStats, Source};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Forward indexing from the last processed height towards the chain head.
#[derive(Debug, Clone, Default)]
pub struct IndexRequest {
    /// Overrides the start height derived from the store.
    pub start: Option<u64>,
    /// Overrides the configured batch size.
    pub batch_size: Option<u64>,
    pub cancellation: CancellationToken,
}

/// Reprocess heights stamped with an older index version.
#[derive(Debug, Clone, Default)]
pub struct BackfillRequest {
    pub force: bool,
    /// Versions whose tasks run. Empty picks every version newer than the oldest stored one.
    pub version_ids: Vec<i64>,
    pub cancellation: CancellationToken,
}

/// Reprocess a filtered subset of already indexed heights.
#[derive(Debug, Clone, Default)]
pub struct ReindexRequest {
    pub version_ids: Vec<i64>,
    pub target_ids: Vec<i64>,
    pub last_in_session: bool,
    pub last_in_era: bool,
    /// `section.method` names; heights containing any of them are reindexed.
    pub transaction_kinds: Vec<String>,
    pub start: u64,
    pub end: Option<u64>,
    pub force: bool,
    pub cancellation: CancellationToken,
}

impl ReindexRequest {
    fn boundary(&self) -> Option<BoundaryFilter> {
        if self.last_in_session {
            Some(BoundaryFilter::LastInSession)
        } else if self.last_in_era {
            Some(BoundaryFilter::LastInEra)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: Report,
    pub stats: RunStats,
}

#[derive(Debug, Clone)]
pub struct IndexerStatus {
    pub index_version: i64,
    pub most_recent_height: Option<u64>,
    pub most_recent_processed: bool,
    /// Lowest height stamped with another index version.
    pub first_outdated_height: Option<u64>,
    pub last_report: Option<Report>,
    pub sink: SinkSnapshot,
}

pub struct IndexingPipeline {
    pipeline: Pipeline<IndexPayload>,
    store: Arc<dyn Store>,
    chain: Arc<dyn ChainClient>,
    targets: TargetsReader,
    cache: Arc<MetaCache>,
    config: IndexerConfig,
    reports: ReportCreator,
    metrics: Arc<SinkMetrics>,
    /// Runs never overlap; they share the height metadata cache.
    run_lock: Mutex<()>,
}

impl IndexingPipeline {
    pub fn new(
        config: IndexerConfig,
        store: Arc<dyn Store>,
        chain: Arc<dyn ChainClient>,
        targets: TargetsReader,
    ) -> Result<Self, IndexerError> {
        let cache = Arc::new(MetaCache::new(config.meta_cache_capacity));
        let ctx = TaskContext {
            store: store.clone(),
            chain: chain.clone(),
            cache: cache.clone(),
            index_version: targets.current_version_id(),
        };
        let pipeline = build_pipeline(&ctx, &config.retry)?;
        Ok(Self {
            pipeline,
            reports: ReportCreator::new(store.clone()),
            store,
            chain,
            targets,
            cache,
            config,
            metrics: Arc::new(SinkMetrics::default()),
            run_lock: Mutex::new(()),
        })
    }

    /// Wire the HTTP chain client, the catalog and the store named by `config`. Without a
    /// database URL the indexer runs against an in-memory store.
    pub async fn connect(config: IndexerConfig) -> Result<Self, IndexerError> {
        let targets = TargetsReader::load(&config.targets_file)?;
        let chain: Arc<dyn ChainClient> = Arc::new(HttpChainClient::new(
            config.chain_proxy_url.clone(),
            config.request_timeout,
        )?);
        let store: Arc<dyn Store> = match &config.database_url {
            Some(url) => Arc::new(PgStore::connect(url).await?),
            None => {
                tracing::warn!("no database configured, using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };
        Self::new(config, store, chain, targets)
    }

    pub fn targets(&self) -> &TargetsReader {
        &self.targets
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn pipeline(&self) -> &Pipeline<IndexPayload> {
        &self.pipeline
    }

    pub fn index_version(&self) -> i64 {
        self.targets.current_version_id()
    }

    pub async fn index(&self, request: IndexRequest) -> Result<RunSummary, IndexerError> {
        let _guard = self.run_lock.lock().await;
        self.cache.clear().await;
        let version = self.index_version();

        let bounds = IndexBounds {
            start_override: request.start,
            first_height: self.config.first_block_height,
            batch_size: request.batch_size.unwrap_or(self.config.default_batch_size),
        };
        let mut source = index_source(self.store.as_ref(), self.chain.as_ref(), &self.cache, bounds).await?;
        let open = self
            .reports
            .create(ReportKind::Index, version, source.start_height(), source.end_height())
            .await?;

        let options = RunOptions::default()
            .with_whitelist(self.targets.all_tasks())
            .with_cancellation(request.cancellation);
        self.execute(open, &mut source, Some(version), &options).await
    }

    pub async fn backfill(&self, request: BackfillRequest) -> Result<RunSummary, IndexerError> {
        let _guard = self.run_lock.lock().await;
        self.cache.clear().await;
        let version = self.index_version();

        let range = scan_outdated(self.store.as_ref(), version).await?;
        let versions = if !request.version_ids.is_empty() {
            request.version_ids.clone()
        } else {
            let newer = self.targets.versions_after(range.oldest_version);
            if newer.is_empty() {
                vec![version]
            } else {
                newer
            }
        };
        let tasks = self.targets.tasks_for_version_ids(&versions)?;
        let filter = self.targets.boundary_filter(&versions)?;
        let kind = if self.targets.is_any_version_sequential(&versions)? {
            ReportKind::SequentialReindex
        } else {
            ReportKind::ParallelReindex
        };

        let resumed = self.reports.check_exclusive(kind, version, request.force).await?;
        let resume = resumed.as_ref().map(|r| (r.start_height, r.end_height));
        let mut source = backfill_source(self.store.as_ref(), range, filter, resume).await?;
        let open = self.open_report(resumed, kind, version, &source).await?;
        tracing::info!(
            start = range.start,
            end = range.end,
            oldest_version = range.oldest_version,
            ?versions,
            ?filter,
            "backfill started"
        );

        let options = RunOptions::default()
            .with_whitelist(tasks)
            .with_cancellation(request.cancellation);
        let summary = self.execute(open, &mut source, Some(version), &options).await?;

        // Filtered backfills skip non-boundary heights; stamp them so they stop showing as outdated.
        if filter.is_some() && !summary.stats.cancelled {
            let (start, end) = resume.unwrap_or((range.start, range.end));
            let stamped = self.store.set_index_version(start, end, version).await?;
            tracing::debug!(start, end, stamped, "skipped heights stamped");
        }
        Ok(summary)
    }

    pub async fn reindex(&self, request: ReindexRequest) -> Result<RunSummary, IndexerError> {
        let _guard = self.run_lock.lock().await;
        self.cache.clear().await;
        let version = self.index_version();

        let tasks = if !request.version_ids.is_empty() {
            self.targets.tasks_for_version_ids(&request.version_ids)?
        } else if !request.target_ids.is_empty() {
            self.targets.tasks_for_target_ids(&request.target_ids)?
        } else {
            self.targets.all_tasks()
        };
        let kind = if !request.version_ids.is_empty()
            && self.targets.is_any_version_sequential(&request.version_ids)?
        {
            ReportKind::SequentialReindex
        } else {
            ReportKind::ParallelReindex
        };

        let resumed = self.reports.check_exclusive(kind, version, request.force).await?;
        let filter = ReindexFilter {
            boundary: request.boundary(),
            transaction_kinds: request.transaction_kinds.clone(),
            start: request.start,
            end: request.end,
        };
        let resume = resumed.as_ref().map(|r| (r.start_height, r.end_height));
        let mut source = reindex_source(self.store.as_ref(), &filter, resume).await?;
        let open = self.open_report(resumed, kind, version, &source).await?;

        let options = RunOptions::default()
            .with_whitelist(tasks)
            .with_cancellation(request.cancellation);
        // Reindexing reruns tasks; it does not move heights to another index version.
        self.execute(open, &mut source, None, &options).await
    }

    /// Run every non-persisting task for `height` and return the payload. Writes nothing.
    pub async fn dry_run(&self, height: u64) -> Result<IndexPayload, IndexerError> {
        let _guard = self.run_lock.lock().await;
        let blacklist: HashSet<TaskId> = TaskId::persistors().collect();
        let options = RunOptions::default()
            .with_whitelist(self.targets.all_tasks())
            .with_blacklist(blacklist);
        Ok(self.pipeline.process(height, &options).await?)
    }

    pub async fn status(&self) -> Result<IndexerStatus, IndexerError> {
        let version = self.index_version();
        let recent = self.store.find_most_recent_syncable().await?;
        let outdated = self.store.find_first_with_other_version(version).await?;
        Ok(IndexerStatus {
            index_version: version,
            most_recent_height: recent.as_ref().map(|s| s.height),
            most_recent_processed: recent.as_ref().is_some_and(|s| s.is_processed()),
            first_outdated_height: outdated.map(|s| s.height),
            last_report: self.store.find_most_recent_report().await?,
            sink: self.metrics.snapshot(),
        })
    }

    async fn open_report(
        &self,
        resumed: Option<Report>,
        kind: ReportKind,
        version: i64,
        source: &ChainSource,
    ) -> Result<OpenReport, IndexerError> {
        match resumed {
            Some(report) => Ok(ReportCreator::resume(report)),
            None => {
                self.reports
                    .create(kind, version, source.start_height(), source.end_height())
                    .await
            }
        }
    }

    /// Drive the source and close the report, on failure too.
    async fn execute(
        &self,
        open: OpenReport,
        source: &mut ChainSource,
        index_version: Option<i64>,
        options: &RunOptions<TaskId>,
    ) -> Result<RunSummary, IndexerError> {
        let report_id = open.report.id;
        let sink = SyncableSink::new(self.store.clone(), report_id, index_version, self.metrics.clone());

        match self.pipeline.run(source, &sink, options).await {
            Ok(stats) => {
                let report = self.reports.complete(open, &stats, None).await?;
                Ok(RunSummary { report, stats })
            }
            Err(failure) => {
                let message = failure.error.to_string();
                if let Err(e) = self.reports.complete(open, &failure.stats, Some(message)).await {
                    tracing::error!(report_id, error = %e, "failed to complete report after run failure");
                }
                Err(IndexerError::Run {
                    report_id,
                    source: failure,
                })
            }
        }
    }
}
