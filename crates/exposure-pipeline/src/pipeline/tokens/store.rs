use chrono::{DateTime, Utc};

use super::domain::{ExposureToken, TokenId, TokenStatus};

/// Result of an idempotent ingestion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new pending token was appended.
    Appended,
    /// The id already exists in the given status; nothing changed.
    DuplicateSuppressed(TokenStatus),
    /// A previously failed token was returned to the pending queue.
    Requeued,
}

/// Durable record of exposure tokens awaiting or undergoing evaluation.
///
/// Every mutation of a single token is atomic with respect to this trait:
/// implementations serialize per-id state changes so callers can rely on
/// check-and-act operations like [`TokenStore::claim`] without external
/// locking. Leases are process-local bookkeeping, never persisted, so a
/// token left `InProgress` by a dead process is claimable again on restart.
pub trait TokenStore: Send + Sync {
    /// Append `id` as a pending token, atomically suppressing duplicates.
    /// With `reingest_failed`, an existing `Failed` token is returned to
    /// `Pending` (attempts reset) instead of being suppressed.
    fn ingest(
        &self,
        id: TokenId,
        received_at: DateTime<Utc>,
        reingest_failed: bool,
    ) -> Result<IngestOutcome, StoreError>;

    /// Take the per-id evaluation lease. Returns the token after moving it
    /// `Pending -> InProgress`, or reclaims an unleased `InProgress` token
    /// left over from a previous process. Returns `None` when the token is
    /// already leased, terminal, or absent.
    fn claim(&self, id: &TokenId) -> Result<Option<ExposureToken>, StoreError>;

    /// Count one evaluation attempt; returns the new total.
    fn record_attempt(&self, id: &TokenId) -> Result<u32, StoreError>;

    /// Terminal success; releases the lease.
    fn complete(&self, id: &TokenId) -> Result<(), StoreError>;

    /// Terminal failure; releases the lease.
    fn fail(&self, id: &TokenId) -> Result<(), StoreError>;

    /// Abandon an in-flight evaluation (shutdown). The token stays
    /// `InProgress` so the next startup sweep resumes it; only the lease
    /// is dropped.
    fn release(&self, id: &TokenId) -> Result<(), StoreError>;

    /// Manual sweep: every `Failed` token back to `Pending`, attempts
    /// reset. Returns the requeued ids.
    fn requeue_failed(&self) -> Result<Vec<TokenId>, StoreError>;

    /// Ids needing evaluation at startup: all `Pending` tokens plus any
    /// unleased `InProgress` leftovers, oldest first.
    fn pending_backlog(&self) -> Result<Vec<TokenId>, StoreError>;

    fn get(&self, id: &TokenId) -> Result<Option<ExposureToken>, StoreError>;

    /// Diagnostics view of every token, oldest first.
    fn snapshot(&self) -> Result<Vec<ExposureToken>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("token not found")]
    NotFound,
    #[error("token store unavailable: {0}")]
    Unavailable(String),
    #[error("token store corrupt: {0}")]
    Corrupt(String),
}
