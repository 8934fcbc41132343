//! Staged, height-by-height task pipeline.
//!
//! - **Source**: yields the heights to process (dense range or sparse whitelist).
//! - **Stage**: an ordered group of [Task]s run either sequentially or concurrently
//!   against one height's [Payload].
//! - **Retrying**: wraps a task with a bounded, transience-gated retry policy.
//! - **Sink**: finalizes a fully processed payload.
//! - **Pipeline**: drives Source → stages → Sink one height at a time until the source is
//!   exhausted, a height fails, or the run is cancelled.
//!
//! Tasks never mutate the payload directly: they read `&P` and return the updates they want
//! applied. A concurrent stage applies its updates after the join, so tasks in one stage cannot
//! observe each other's output.

pub mod pipeline;
pub mod retry;
pub mod sink;
pub mod source;
pub mod stage;
pub mod task;

#[cfg(test)]
pub(crate) mod test_support;

pub use pipeline::{Pipeline, PipelineBuilder, PipelineError, RunFailure, RunOptions, RunStats};
pub use retry::{RetryConfig, Retrying};
pub use sink::Sink;
pub use source::{Heights, Source};
pub use stage::{Stage, StageKind, StageName};
pub use task::{BoxError, Payload, Task, TaskError};
