use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::domain::{ExposureToken, TokenId, TokenStatus};
use super::store::{IngestOutcome, StoreError, TokenStore};
use super::table::TokenTable;

/// Reference store for tests, the simulation command, and serving without a
/// data directory. State is lost on process exit.
#[derive(Default)]
pub struct MemoryTokenStore {
    table: Mutex<TokenTable>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn ingest(
        &self,
        id: TokenId,
        received_at: DateTime<Utc>,
        reingest_failed: bool,
    ) -> Result<IngestOutcome, StoreError> {
        let mut table = self.table.lock().expect("token table mutex poisoned");
        Ok(table.ingest(id, received_at, reingest_failed))
    }

    fn claim(&self, id: &TokenId) -> Result<Option<ExposureToken>, StoreError> {
        let mut table = self.table.lock().expect("token table mutex poisoned");
        Ok(table.claim(id))
    }

    fn record_attempt(&self, id: &TokenId) -> Result<u32, StoreError> {
        let mut table = self.table.lock().expect("token table mutex poisoned");
        table.record_attempt(id)
    }

    fn complete(&self, id: &TokenId) -> Result<(), StoreError> {
        let mut table = self.table.lock().expect("token table mutex poisoned");
        table.finish(id, TokenStatus::Completed)
    }

    fn fail(&self, id: &TokenId) -> Result<(), StoreError> {
        let mut table = self.table.lock().expect("token table mutex poisoned");
        table.finish(id, TokenStatus::Failed)
    }

    fn release(&self, id: &TokenId) -> Result<(), StoreError> {
        let mut table = self.table.lock().expect("token table mutex poisoned");
        table.release(id)
    }

    fn requeue_failed(&self) -> Result<Vec<TokenId>, StoreError> {
        let mut table = self.table.lock().expect("token table mutex poisoned");
        Ok(table.requeue_failed())
    }

    fn pending_backlog(&self) -> Result<Vec<TokenId>, StoreError> {
        let table = self.table.lock().expect("token table mutex poisoned");
        Ok(table.pending_backlog())
    }

    fn get(&self, id: &TokenId) -> Result<Option<ExposureToken>, StoreError> {
        let table = self.table.lock().expect("token table mutex poisoned");
        Ok(table.get(id))
    }

    fn snapshot(&self) -> Result<Vec<ExposureToken>, StoreError> {
        let table = self.table.lock().expect("token table mutex poisoned");
        Ok(table.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn store_with(id: &str) -> MemoryTokenStore {
        let store = MemoryTokenStore::new();
        store
            .ingest(TokenId::from(id), Utc::now(), false)
            .expect("ingest succeeds");
        store
    }

    #[test]
    fn ingest_is_idempotent_per_id() {
        let store = store_with("tok-1");
        let outcome = store
            .ingest(TokenId::from("tok-1"), Utc::now(), false)
            .expect("ingest succeeds");
        assert_eq!(
            outcome,
            IngestOutcome::DuplicateSuppressed(TokenStatus::Pending)
        );
        assert_eq!(store.snapshot().expect("snapshot").len(), 1);
    }

    #[test]
    fn claim_excludes_second_caller() {
        let store = store_with("tok-1");
        let id = TokenId::from("tok-1");
        let first = store.claim(&id).expect("claim succeeds");
        assert!(first.is_some());
        let second = store.claim(&id).expect("claim succeeds");
        assert!(second.is_none(), "second claim must be suppressed");
    }

    #[test]
    fn released_token_is_claimable_again() {
        let store = store_with("tok-1");
        let id = TokenId::from("tok-1");
        store.claim(&id).expect("claim").expect("token claimed");
        store.release(&id).expect("release succeeds");
        let token = store.get(&id).expect("get").expect("token present");
        assert_eq!(token.status, TokenStatus::InProgress);
        assert!(store.claim(&id).expect("claim").is_some());
    }

    #[test]
    fn failed_token_requeues_only_when_policy_allows() {
        let store = store_with("tok-1");
        let id = TokenId::from("tok-1");
        store.claim(&id).expect("claim").expect("token claimed");
        store.fail(&id).expect("fail succeeds");

        let suppressed = store
            .ingest(id.clone(), Utc::now(), false)
            .expect("ingest succeeds");
        assert_eq!(
            suppressed,
            IngestOutcome::DuplicateSuppressed(TokenStatus::Failed)
        );

        let requeued = store
            .ingest(id.clone(), Utc::now(), true)
            .expect("ingest succeeds");
        assert_eq!(requeued, IngestOutcome::Requeued);
        let token = store.get(&id).expect("get").expect("token present");
        assert_eq!(token.status, TokenStatus::Pending);
        assert_eq!(token.attempts, 0);
    }

    #[test]
    fn requeue_failed_sweeps_all_failed_tokens() {
        let store = MemoryTokenStore::new();
        for id in ["a", "b", "c"] {
            store
                .ingest(TokenId::from(id), Utc::now(), false)
                .expect("ingest");
        }
        for id in ["a", "b"] {
            let id = TokenId::from(id);
            store.claim(&id).expect("claim").expect("claimed");
            store.fail(&id).expect("fail");
        }

        let requeued = store.requeue_failed().expect("requeue succeeds");
        assert_eq!(requeued.len(), 2);
        let backlog = store.pending_backlog().expect("backlog");
        assert_eq!(backlog.len(), 3);
    }

    #[test]
    fn backlog_orders_by_receipt_and_skips_leased() {
        let store = MemoryTokenStore::new();
        let base = Utc::now();
        store
            .ingest(TokenId::from("late"), base + chrono::Duration::seconds(5), false)
            .expect("ingest");
        store
            .ingest(TokenId::from("early"), base, false)
            .expect("ingest");
        store
            .claim(&TokenId::from("late"))
            .expect("claim")
            .expect("claimed");

        let backlog = store.pending_backlog().expect("backlog");
        assert_eq!(backlog, vec![TokenId::from("early")]);
    }
}
