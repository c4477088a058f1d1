//! Session-context observer seam.
//!
//! The orchestrator reports token consumption and recoverable context
//! overflows through this trait instead of an event bus, so the session
//! layer is an explicit, injected collaborator. Notifications are best
//! effort: a failing observer is logged and never fails the request.

use async_trait::async_trait;
use relay_core::Usage;
use thiserror::Error;

/// Failure raised by an observer implementation
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ObserverError(pub String);

/// Receives best-effort notifications about session activity
#[async_trait]
pub trait SessionObserver: Send + Sync + 'static {
    /// A request for `session_id` consumed `usage` tokens (cached or live)
    ///
    /// # Errors
    /// Implementations may fail; the orchestrator logs and continues
    async fn on_tokens(&self, session_id: &str, usage: &Usage) -> Result<(), ObserverError>;

    /// A recoverable context-window overflow surfaced for `session_id`
    ///
    /// # Errors
    /// Implementations may fail; the orchestrator logs and continues
    async fn on_context_overflow(&self, session_id: &str) -> Result<(), ObserverError>;
}

/// Observer that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

#[async_trait]
impl SessionObserver for NoopObserver {
    async fn on_tokens(&self, _session_id: &str, _usage: &Usage) -> Result<(), ObserverError> {
        Ok(())
    }

    async fn on_context_overflow(&self, _session_id: &str) -> Result<(), ObserverError> {
        Ok(())
    }
}
