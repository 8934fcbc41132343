//! Pipeline orchestrator: Source → stages → Sink, one height at a time.

use crate::sink::Sink;
use crate::source::Source;
use crate::stage::{Stage, StageName};
use crate::task::{BoxError, Payload, TaskError};
use std::collections::HashSet;
use std::hash::Hash;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("task {task} failed in {stage} stage at height {height}: {source}")]
    Task {
        stage: StageName,
        task: String,
        height: u64,
        #[source]
        source: TaskError,
    },

    #[error("sink failed at height {height}: {source}")]
    Sink {
        height: u64,
        #[source]
        source: BoxError,
    },

    #[error("invalid pipeline definition: {0}")]
    Definition(String),
}

/// Per-run task selection and cancellation.
#[derive(Debug, Clone)]
pub struct RunOptions<Id: Eq + Hash> {
    /// When set, only these tasks run.
    pub whitelist: Option<HashSet<Id>>,
    /// These tasks never run (applied after the whitelist).
    pub blacklist: HashSet<Id>,
    /// Checked between heights.
    pub cancellation: CancellationToken,
}

impl<Id: Eq + Hash> Default for RunOptions<Id> {
    fn default() -> Self {
        Self {
            whitelist: None,
            blacklist: HashSet::new(),
            cancellation: CancellationToken::new(),
        }
    }
}

impl<Id: Eq + Hash> RunOptions<Id> {
    pub fn with_whitelist(mut self, whitelist: HashSet<Id>) -> Self {
        self.whitelist = Some(whitelist);
        self
    }

    pub fn with_blacklist(mut self, blacklist: HashSet<Id>) -> Self {
        self.blacklist = blacklist;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn allows(&self, id: Id) -> bool {
        let whitelisted = self.whitelist.as_ref().map(|w| w.contains(&id)).unwrap_or(true);
        whitelisted && !self.blacklist.contains(&id)
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub success_count: u64,
    pub error_count: u64,
    pub last_height: Option<u64>,
    pub cancelled: bool,
    pub duration: Duration,
}

/// A run that stopped on a failing height. Carries the counts accumulated so far.
#[derive(Debug, Error)]
#[error("run stopped after {} heights: {error}", .stats.success_count)]
pub struct RunFailure {
    pub stats: RunStats,
    #[source]
    pub error: PipelineError,
}

/// Builder for [Pipeline].
pub struct PipelineBuilder<P: Payload> {
    stages: Vec<Stage<P>>,
}

impl<P: Payload> PipelineBuilder<P> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn stage(mut self, stage: Stage<P>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Orders stages by [StageName] and rejects duplicates.
    pub fn build(mut self) -> Result<Pipeline<P>, PipelineError> {
        self.stages.sort_by_key(|s| s.name());
        for pair in self.stages.windows(2) {
            if pair[0].name() == pair[1].name() {
                return Err(PipelineError::Definition(format!(
                    "stage {} declared twice",
                    pair[0].name()
                )));
            }
        }
        let mut seen = HashSet::new();
        for stage in &self.stages {
            for id in stage.task_ids() {
                if !seen.insert(id) {
                    return Err(PipelineError::Definition(format!("task {id} declared twice")));
                }
            }
        }
        Ok(Pipeline {
            stages: self.stages,
        })
    }
}

impl<P: Payload> Default for PipelineBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable pipeline definition, built once and reused across runs.
pub struct Pipeline<P: Payload> {
    stages: Vec<Stage<P>>,
}

impl<P: Payload> Pipeline<P> {
    pub fn builder() -> PipelineBuilder<P> {
        PipelineBuilder::new()
    }

    pub fn stages(&self) -> &[Stage<P>] {
        &self.stages
    }

    /// Every task id in stage order.
    pub fn task_ids(&self) -> Vec<P::TaskId> {
        self.stages.iter().flat_map(|s| s.task_ids()).collect()
    }

    /// Run every stage for one height and return the resulting payload. No sink.
    pub async fn process(&self, height: u64, options: &RunOptions<P::TaskId>) -> Result<P, PipelineError> {
        let mut payload = P::for_height(height);
        for stage in &self.stages {
            stage.run(&mut payload, options).await?;
        }
        Ok(payload)
    }

    /// Drive `source` to exhaustion. Stops at the first failing height or when the
    /// cancellation token fires (checked between heights).
    pub async fn run<Src, Snk>(
        &self,
        source: &mut Src,
        sink: &Snk,
        options: &RunOptions<P::TaskId>,
    ) -> Result<RunStats, RunFailure>
    where
        Src: Source + ?Sized,
        Snk: Sink<P>,
    {
        let started = Instant::now();
        let mut stats = RunStats::default();
        tracing::info!(
            start = source.start_height(),
            end = source.end_height(),
            heights = source.len(),
            "pipeline run started"
        );

        while let Some(height) = source.next_height() {
            if options.cancellation.is_cancelled() {
                tracing::info!(height, "pipeline run cancelled");
                stats.cancelled = true;
                break;
            }
            let height_started = Instant::now();
            let outcome = match self.process(height, options).await {
                Ok(payload) => sink.consume(&payload).await.map_err(|e| PipelineError::Sink {
                    height,
                    source: Box::new(e),
                }),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    stats.success_count += 1;
                    stats.last_height = Some(height);
                    tracing::debug!(height, elapsed_ms = height_started.elapsed().as_millis() as u64, "height processed");
                }
                Err(error) => {
                    stats.error_count += 1;
                    stats.duration = started.elapsed();
                    tracing::error!(height, reason = %error, "height failed, stopping run");
                    return Err(RunFailure { stats, error });
                }
            }
        }

        stats.duration = started.elapsed();
        tracing::info!(
            success = stats.success_count,
            cancelled = stats.cancelled,
            elapsed_ms = stats.duration.as_millis() as u64,
            "pipeline run finished"
        );
        Ok(stats)
    }
}
