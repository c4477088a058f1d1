//! Structured failures raised by the upstream boundary.
//!
//! The transport is an external collaborator; this module only defines the
//! shapes it may fail with so the resilience layer can classify them.

use thiserror::Error;

/// Failure raised by an `UpstreamClient` implementation
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Structured API failure carrying an HTTP-like status
    #[error("upstream API error (status {status}): {message}")]
    Api {
        /// HTTP status returned by the service
        status: u16,
        /// Error message from the service
        message: String,
        /// Service-reported error type, when present
        kind: Option<String>,
    },

    /// Transport-level failure (connection, DNS, timeout) with no status
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport fault
        message: String,
    },

    /// Any other failure the transport could not shape further
    #[error("upstream error: {message}")]
    Other {
        /// Description of the fault
        message: String,
    },
}

impl UpstreamError {
    /// Create a structured API failure
    #[must_use]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            kind: None,
        }
    }

    /// Create a structured API failure with a service error type
    #[must_use]
    pub fn api_with_kind(status: u16, message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a transport failure
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an unshaped failure
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// The HTTP status, if this failure carries one
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The failure message
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Api { message, .. } | Self::Transport { message } | Self::Other { message } => {
                message
            }
        }
    }
}
