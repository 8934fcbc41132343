//! Toy payload, tasks and sink for unit tests.

use crate::sink::Sink;
use crate::task::{Payload, Task, TaskError};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Route run logs to the test writer; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestTaskId {
    A,
    B,
    C,
}

impl fmt::Display for TestTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestUpdate {
    /// Task id and the number of records it saw when it ran.
    Record(TestTaskId, u64),
}

#[derive(Debug, Default)]
pub struct TestPayload {
    pub height: u64,
    pub records: Vec<TestUpdate>,
}

impl Payload for TestPayload {
    type TaskId = TestTaskId;
    type Update = TestUpdate;

    fn for_height(height: u64) -> Self {
        Self {
            height,
            records: Vec::new(),
        }
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn apply(&mut self, update: TestUpdate) {
        self.records.push(update);
    }
}

pub fn boxed<T: Task<TestPayload> + 'static>(task: T) -> Box<dyn Task<TestPayload>> {
    Box::new(task)
}

pub struct RecordingTask {
    id: TestTaskId,
    delay: Duration,
}

impl RecordingTask {
    pub fn new(id: TestTaskId) -> Self {
        Self {
            id,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Task<TestPayload> for RecordingTask {
    fn id(&self) -> TestTaskId {
        self.id
    }

    async fn run(&self, payload: &TestPayload) -> Result<Vec<TestUpdate>, TaskError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(vec![TestUpdate::Record(self.id, payload.records.len() as u64)])
    }
}

/// Fails its first `failures` calls, then records.
pub struct FlakyTask {
    id: TestTaskId,
    failures: u32,
    transient: bool,
    pub calls: Arc<AtomicU32>,
}

impl FlakyTask {
    pub fn transient(id: TestTaskId, failures: u32) -> Self {
        Self {
            id,
            failures,
            transient: true,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn fatal(id: TestTaskId, failures: u32) -> Self {
        Self {
            transient: false,
            ..Self::transient(id, failures)
        }
    }
}

#[async_trait]
impl Task<TestPayload> for FlakyTask {
    fn id(&self) -> TestTaskId {
        self.id
    }

    async fn run(&self, payload: &TestPayload) -> Result<Vec<TestUpdate>, TaskError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(if self.transient {
                TaskError::transient("connection reset")
            } else {
                TaskError::fatal("broken")
            });
        }
        Ok(vec![TestUpdate::Record(self.id, payload.records.len() as u64)])
    }
}

/// Fails fatally at one height only.
pub struct FailAt {
    id: TestTaskId,
    height: u64,
}

impl FailAt {
    pub fn new(id: TestTaskId, height: u64) -> Self {
        Self { id, height }
    }
}

#[async_trait]
impl Task<TestPayload> for FailAt {
    fn id(&self) -> TestTaskId {
        self.id
    }

    async fn run(&self, payload: &TestPayload) -> Result<Vec<TestUpdate>, TaskError> {
        if payload.height == self.height {
            return Err(TaskError::Validation(format!("bad height {}", self.height)));
        }
        Ok(vec![TestUpdate::Record(self.id, payload.records.len() as u64)])
    }
}

#[derive(Debug, thiserror::Error)]
#[error("sink rejected height {0}")]
pub struct SinkRejected(pub u64);

#[derive(Default)]
pub struct CollectingSink {
    seen: Mutex<Vec<(u64, usize)>>,
    fail_at: Option<u64>,
}

impl CollectingSink {
    pub fn failing_at(height: u64) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            fail_at: Some(height),
        }
    }

    pub fn heights(&self) -> Vec<u64> {
        self.seen.lock().unwrap().iter().map(|(h, _)| *h).collect()
    }

    pub fn record_counts(&self) -> Vec<usize> {
        self.seen.lock().unwrap().iter().map(|(_, n)| *n).collect()
    }
}

#[async_trait]
impl Sink<TestPayload> for CollectingSink {
    type Error = SinkRejected;

    async fn consume(&self, payload: &TestPayload) -> Result<(), SinkRejected> {
        if self.fail_at == Some(payload.height) {
            return Err(SinkRejected(payload.height));
        }
        self.seen
            .lock()
            .unwrap()
            .push((payload.height, payload.records.len()));
        Ok(())
    }
}
