use std::time::Duration;

use async_trait::async_trait;

use crate::pipeline::isolation::RiskOutcome;
use crate::pipeline::tokens::TokenId;

/// Server-issued handle for polling an evaluation that is not yet resolved.
/// Lives only for one evaluation sequence; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollToken(pub String);

/// One round of the remote risk-evaluation protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalResponse {
    /// Definitive outcome; evaluation is over.
    Resolved(RiskOutcome),
    /// Not ready: poll again with `poll_token`, no earlier than
    /// `retry_after` from now.
    Pending {
        poll_token: PollToken,
        retry_after: Duration,
    },
}

/// Remote risk-evaluation service. Implementations must be idempotent-safe
/// to resubmit: a resumed `request_approval` for an already-recorded token
/// must not double-count the outcome server-side.
#[async_trait]
pub trait CircuitBreakerApi: Send + Sync {
    async fn request_approval(&self, token: &TokenId) -> Result<ApprovalResponse, RemoteError>;
    async fn poll(&self, poll_token: &PollToken) -> Result<ApprovalResponse, RemoteError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// The call did not complete in time; retried as transient.
    #[error("remote call timed out")]
    Timeout,
    /// Network-level failure; retried with backoff.
    #[error("remote transport error: {0}")]
    Transport(String),
    /// The server answered with something we cannot interpret. Retried as
    /// transient, but also surfaced to diagnostics.
    #[error("remote protocol error: {0}")]
    Protocol(String),
}

impl RemoteError {
    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}
