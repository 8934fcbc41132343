//! Stages: ordered groups of tasks with a fixed position in the pipeline.

use crate::pipeline::{PipelineError, RunOptions};
use crate::task::{Payload, Task, TaskError};
use futures_util::future::join_all;
use std::fmt;

/// Fixed, linear stage topology. Stages always execute in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageName {
    Setup,
    Syncer,
    Fetcher,
    Parser,
    Sequencer,
    Aggregator,
    Persistor,
    Analyzer,
}

impl StageName {
    pub const ORDERED: [StageName; 8] = [
        StageName::Setup,
        StageName::Syncer,
        StageName::Fetcher,
        StageName::Parser,
        StageName::Sequencer,
        StageName::Aggregator,
        StageName::Persistor,
        StageName::Analyzer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Setup => "setup",
            StageName::Syncer => "syncer",
            StageName::Fetcher => "fetcher",
            StageName::Parser => "parser",
            StageName::Sequencer => "sequencer",
            StageName::Aggregator => "aggregator",
            StageName::Persistor => "persistor",
            StageName::Analyzer => "analyzer",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Tasks run one after another; the first error aborts the stage.
    Sequential,
    /// Tasks run together against the same payload; the stage fails if any task failed.
    Concurrent,
}

pub struct Stage<P: Payload> {
    name: StageName,
    kind: StageKind,
    tasks: Vec<Box<dyn Task<P>>>,
}

impl<P: Payload> Stage<P> {
    pub fn sequential(name: StageName, tasks: Vec<Box<dyn Task<P>>>) -> Self {
        Self {
            name,
            kind: StageKind::Sequential,
            tasks,
        }
    }

    pub fn concurrent(name: StageName, tasks: Vec<Box<dyn Task<P>>>) -> Self {
        Self {
            name,
            kind: StageKind::Concurrent,
            tasks,
        }
    }

    pub fn name(&self) -> StageName {
        self.name
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn task_ids(&self) -> Vec<P::TaskId> {
        self.tasks.iter().map(|t| t.id()).collect()
    }

    /// Run the tasks allowed by `options` against `payload`.
    pub async fn run(&self, payload: &mut P, options: &RunOptions<P::TaskId>) -> Result<(), PipelineError> {
        let selected: Vec<&dyn Task<P>> = self
            .tasks
            .iter()
            .map(|t| t.as_ref())
            .filter(|t| options.allows(t.id()))
            .collect();
        if selected.is_empty() {
            return Ok(());
        }
        tracing::trace!(stage = %self.name, tasks = selected.len(), height = payload.height(), "running stage");

        match self.kind {
            StageKind::Sequential => {
                for task in selected {
                    let updates = task
                        .run(payload)
                        .await
                        .map_err(|e| self.task_failed(payload.height(), task.id(), e))?;
                    for update in updates {
                        payload.apply(update);
                    }
                }
            }
            StageKind::Concurrent => {
                let shared: &P = payload;
                let height = shared.height();
                let results = join_all(
                    selected
                        .iter()
                        .map(|task| async move { (task.id(), task.run(shared).await) }),
                )
                .await;

                let mut collected = Vec::new();
                let mut first_error = None;
                for (id, result) in results {
                    match result {
                        Ok(updates) => collected.extend(updates),
                        Err(e) if first_error.is_none() => first_error = Some((id, e)),
                        Err(e) => {
                            tracing::warn!(stage = %self.name, task = %id, height, reason = %e, "additional task failure in stage");
                        }
                    }
                }
                if let Some((id, e)) = first_error {
                    return Err(self.task_failed(height, id, e));
                }
                for update in collected {
                    payload.apply(update);
                }
            }
        }
        Ok(())
    }

    fn task_failed(&self, height: u64, task: P::TaskId, source: TaskError) -> PipelineError {
        PipelineError::Task {
            stage: self.name,
            task: task.to_string(),
            height,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{boxed, FlakyTask, RecordingTask, TestPayload, TestTaskId, TestUpdate};
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn stage_names_are_ordered() {
        let mut sorted = StageName::ORDERED.to_vec();
        sorted.sort();
        assert_eq!(sorted, StageName::ORDERED.to_vec());
        assert_eq!(StageName::Persistor.to_string(), "persistor");
    }

    #[tokio::test]
    async fn sequential_tasks_see_earlier_updates() {
        let stage = Stage::sequential(
            StageName::Parser,
            vec![
                boxed(RecordingTask::new(TestTaskId::A)),
                boxed(RecordingTask::new(TestTaskId::B)),
            ],
        );
        let mut payload = TestPayload::for_height(3);
        stage.run(&mut payload, &RunOptions::default()).await.unwrap();
        // B observed A's record.
        assert_eq!(
            payload.records,
            vec![TestUpdate::Record(TestTaskId::A, 0), TestUpdate::Record(TestTaskId::B, 1)]
        );
    }

    #[tokio::test]
    async fn concurrent_tasks_do_not_see_each_other() {
        let stage = Stage::concurrent(
            StageName::Fetcher,
            vec![
                boxed(RecordingTask::new(TestTaskId::A).with_delay(Duration::from_millis(20))),
                boxed(RecordingTask::new(TestTaskId::B)),
                boxed(RecordingTask::new(TestTaskId::C)),
            ],
        );
        let mut payload = TestPayload::for_height(3);
        stage.run(&mut payload, &RunOptions::default()).await.unwrap();
        // Updates land in declared order and every task saw an empty payload.
        assert_eq!(
            payload.records,
            vec![
                TestUpdate::Record(TestTaskId::A, 0),
                TestUpdate::Record(TestTaskId::B, 0),
                TestUpdate::Record(TestTaskId::C, 0),
            ]
        );
    }

    #[tokio::test]
    async fn concurrent_failure_discards_updates() {
        let stage = Stage::concurrent(
            StageName::Fetcher,
            vec![
                boxed(RecordingTask::new(TestTaskId::A)),
                boxed(FlakyTask::fatal(TestTaskId::B, 1)),
            ],
        );
        let mut payload = TestPayload::for_height(9);
        let err = stage.run(&mut payload, &RunOptions::default()).await.unwrap_err();
        match err {
            PipelineError::Task { stage, task, height, .. } => {
                assert_eq!(stage, StageName::Fetcher);
                assert_eq!(task, "B");
                assert_eq!(height, 9);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(payload.records.is_empty());
    }

    #[tokio::test]
    async fn sequential_failure_stops_later_tasks() {
        let stage = Stage::sequential(
            StageName::Persistor,
            vec![
                boxed(FlakyTask::fatal(TestTaskId::A, 1)),
                boxed(RecordingTask::new(TestTaskId::B)),
            ],
        );
        let mut payload = TestPayload::for_height(1);
        assert!(stage.run(&mut payload, &RunOptions::default()).await.is_err());
        assert!(payload.records.is_empty());
    }

    #[tokio::test]
    async fn whitelist_filters_tasks() {
        let stage = Stage::sequential(
            StageName::Sequencer,
            vec![
                boxed(RecordingTask::new(TestTaskId::A)),
                boxed(RecordingTask::new(TestTaskId::B)),
            ],
        );
        let options = RunOptions::default().with_whitelist(HashSet::from([TestTaskId::B]));
        let mut payload = TestPayload::for_height(1);
        stage.run(&mut payload, &options).await.unwrap();
        assert_eq!(payload.records, vec![TestUpdate::Record(TestTaskId::B, 0)]);
    }
}
