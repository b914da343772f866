use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use super::domain::{ExposureToken, TokenId, TokenStatus};
use super::store::{IngestOutcome, StoreError};

/// Shared transition logic for the in-memory and file-backed stores.
///
/// The token map is ordered by id; callers wanting received-at order sort a
/// copy. `leased` is process-local and deliberately excluded from any
/// serialized form.
#[derive(Debug, Default)]
pub(crate) struct TokenTable {
    tokens: BTreeMap<TokenId, ExposureToken>,
    leased: HashSet<TokenId>,
}

impl TokenTable {
    pub(crate) fn from_tokens(tokens: Vec<ExposureToken>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|token| (token.id.clone(), token))
                .collect(),
            leased: HashSet::new(),
        }
    }

    pub(crate) fn ingest(
        &mut self,
        id: TokenId,
        received_at: DateTime<Utc>,
        reingest_failed: bool,
    ) -> IngestOutcome {
        match self.tokens.get_mut(&id) {
            None => {
                self.tokens
                    .insert(id.clone(), ExposureToken::pending(id, received_at));
                IngestOutcome::Appended
            }
            Some(existing) if existing.status == TokenStatus::Failed && reingest_failed => {
                existing.status = TokenStatus::Pending;
                existing.attempts = 0;
                existing.received_at = received_at;
                IngestOutcome::Requeued
            }
            Some(existing) => IngestOutcome::DuplicateSuppressed(existing.status),
        }
    }

    pub(crate) fn claim(&mut self, id: &TokenId) -> Option<ExposureToken> {
        let token = self.tokens.get_mut(id)?;
        let claimable = match token.status {
            TokenStatus::Pending => true,
            TokenStatus::InProgress => !self.leased.contains(id),
            TokenStatus::Completed | TokenStatus::Failed => false,
        };
        if !claimable {
            return None;
        }
        token.status = TokenStatus::InProgress;
        self.leased.insert(id.clone());
        Some(token.clone())
    }

    pub(crate) fn record_attempt(&mut self, id: &TokenId) -> Result<u32, StoreError> {
        let token = self.tokens.get_mut(id).ok_or(StoreError::NotFound)?;
        token.attempts += 1;
        Ok(token.attempts)
    }

    pub(crate) fn finish(&mut self, id: &TokenId, status: TokenStatus) -> Result<(), StoreError> {
        let token = self.tokens.get_mut(id).ok_or(StoreError::NotFound)?;
        token.status = status;
        self.leased.remove(id);
        Ok(())
    }

    pub(crate) fn release(&mut self, id: &TokenId) -> Result<(), StoreError> {
        if !self.tokens.contains_key(id) {
            return Err(StoreError::NotFound);
        }
        self.leased.remove(id);
        Ok(())
    }

    pub(crate) fn requeue_failed(&mut self) -> Vec<TokenId> {
        let mut requeued = Vec::new();
        for token in self.tokens.values_mut() {
            if token.status == TokenStatus::Failed {
                token.status = TokenStatus::Pending;
                token.attempts = 0;
                requeued.push(token.id.clone());
            }
        }
        requeued
    }

    pub(crate) fn pending_backlog(&self) -> Vec<TokenId> {
        let mut backlog: Vec<&ExposureToken> = self
            .tokens
            .values()
            .filter(|token| match token.status {
                TokenStatus::Pending => true,
                TokenStatus::InProgress => !self.leased.contains(&token.id),
                _ => false,
            })
            .collect();
        backlog.sort_by_key(|token| token.received_at);
        backlog.into_iter().map(|token| token.id.clone()).collect()
    }

    pub(crate) fn get(&self, id: &TokenId) -> Option<ExposureToken> {
        self.tokens.get(id).cloned()
    }

    pub(crate) fn snapshot(&self) -> Vec<ExposureToken> {
        let mut all: Vec<ExposureToken> = self.tokens.values().cloned().collect();
        all.sort_by_key(|token| token.received_at);
        all
    }

    pub(crate) fn tokens(&self) -> Vec<ExposureToken> {
        self.tokens.values().cloned().collect()
    }
}
