//! Upstream client boundary.
//!
//! The relay treats the network/SDK call as an opaque operation behind this
//! trait: exactly one invocation per attempt, returning either a response or
//! a structured `UpstreamError`.

use crate::error::UpstreamError;
use crate::request::ChatRequest;
use crate::response::ChatResponse;
use crate::streaming::UpstreamChunk;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of upstream chunks
pub type UpstreamStream = BoxStream<'static, Result<UpstreamChunk, UpstreamError>>;

/// The opaque network operation the orchestrator drives
#[async_trait]
pub trait UpstreamClient: Send + Sync + 'static {
    /// Execute a unary completion
    ///
    /// # Errors
    /// Returns `UpstreamError` on any transport or service failure
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, UpstreamError>;

    /// Execute a streaming completion
    ///
    /// The returned stream yields content deltas and, near the end, a chunk
    /// carrying usage and a finish reason. Dropping the stream releases the
    /// underlying transport resources.
    ///
    /// # Errors
    /// Returns `UpstreamError` if the stream cannot be established
    async fn complete_stream(&self, request: &ChatRequest) -> Result<UpstreamStream, UpstreamError>;
}
