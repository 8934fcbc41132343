//! Sink: finalizes one fully processed height.

use crate::task::Payload;
use async_trait::async_trait;

/// Consumes the payload after the last stage. A sink failure fails the height; the sink
/// itself does not retry.
#[async_trait]
pub trait Sink<P: Payload>: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn consume(&self, payload: &P) -> Result<(), Self::Error>;
}
