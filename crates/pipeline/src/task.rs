//! Task and payload contracts.

use async_trait::async_trait;
use std::fmt;
use std::hash::Hash;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Per-height working record shared by all tasks of one height.
///
/// `Update` enumerates every field a task may write. Tasks return updates instead of
/// mutating, so a concurrent stage can lend the same payload to all of its tasks.
pub trait Payload: Send + Sync + 'static {
    /// Identity of the tasks operating on this payload (used by whitelists).
    type TaskId: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    type Update: Send + 'static;

    /// Fresh payload for `height`.
    fn for_height(height: u64) -> Self;

    fn height(&self) -> u64;

    fn apply(&mut self, update: Self::Update);
}

/// Named unit of work for one height.
#[async_trait]
pub trait Task<P: Payload>: Send + Sync {
    fn id(&self) -> P::TaskId;

    /// Read the payload and return the updates to apply. An empty vec means "nothing to do
    /// at this height".
    async fn run(&self, payload: &P) -> Result<Vec<P::Update>, TaskError>;
}

#[derive(Debug, Error)]
pub enum TaskError {
    /// Remote call or store I/O that may succeed on another attempt.
    #[error("transient failure: {0}")]
    Transient(BoxError),

    /// A computed record failed its own invariant check.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An earlier task did not produce what this one needs.
    #[error("missing input: {0}")]
    MissingInput(&'static str),

    #[error("{0}")]
    Fatal(BoxError),
}

impl TaskError {
    pub fn transient(err: impl Into<BoxError>) -> Self {
        Self::Transient(err.into())
    }

    pub fn fatal(err: impl Into<BoxError>) -> Self {
        Self::Fatal(err.into())
    }

    /// Default retry predicate: only I/O-classified failures are retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, TaskError::Transient(_))
    }
}
