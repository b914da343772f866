use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::FailedTokenPolicy;

use super::circuit_breaker::WorkSender;
use super::tokens::{IngestOutcome, TokenId, TokenStore};

/// Action the platform broadcasts when exposure state changes. Any other
/// action is ignored outright.
pub const ACTION_EXPOSURE_STATE_UPDATED: &str =
    "com.google.android.gms.exposurenotification.ACTION_EXPOSURE_STATE_UPDATED";

/// Well-known extras key carrying the exposure token.
pub const EXTRA_TOKEN: &str = "com.google.android.gms.exposurenotification.EXTRA_TOKEN";

/// Inbound platform signal: an action identifier plus string extras.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureSignal {
    action: String,
    extras: BTreeMap<String, String>,
}

impl ExposureSignal {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            extras: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: &str) -> Self {
        self.extras.insert(key.to_string(), value.to_string());
        self
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    fn token_extra(&self) -> Option<&str> {
        self.extras.get(EXTRA_TOKEN).map(String::as_str)
    }
}

/// How the receiver disposed of a signal. Returned for observability;
/// callers never branch on it to recover, because there is nothing to
/// recover — malformed input is absorbed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalDisposition {
    /// Action did not match; no side effect.
    Ignored,
    /// Matching action but no usable token; logged and dropped.
    Discarded,
    /// Token reached the store.
    Accepted(IngestOutcome),
}

/// Stateless adapter from platform signals to token-store writes.
///
/// Runs synchronously on the caller's thread and never performs network
/// I/O: it persists the work item and wakes the worker, nothing more.
pub struct SignalReceiver {
    store: Arc<dyn TokenStore>,
    queue: WorkSender,
    failed_token_policy: FailedTokenPolicy,
}

impl SignalReceiver {
    pub fn new(
        store: Arc<dyn TokenStore>,
        queue: WorkSender,
        failed_token_policy: FailedTokenPolicy,
    ) -> Self {
        Self {
            store,
            queue,
            failed_token_policy,
        }
    }

    pub fn on_signal(&self, signal: &ExposureSignal, now: DateTime<Utc>) -> SignalDisposition {
        if signal.action() != ACTION_EXPOSURE_STATE_UPDATED {
            return SignalDisposition::Ignored;
        }

        let token = match signal.token_extra() {
            Some(raw) if !raw.trim().is_empty() => TokenId(raw.trim().to_string()),
            _ => {
                warn!("exposure signal without token extra discarded");
                return SignalDisposition::Discarded;
            }
        };

        let outcome = match self.store.ingest(
            token.clone(),
            now,
            self.failed_token_policy.reingests_on_signal(),
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(token = %token, error = %err, "token store rejected exposure signal");
                return SignalDisposition::Discarded;
            }
        };

        match &outcome {
            IngestOutcome::Appended => {
                info!(token = %token, "exposure token queued for risk evaluation");
                self.wake_worker(&token);
            }
            IngestOutcome::Requeued => {
                info!(token = %token, "failed exposure token re-ingested for retry");
                self.wake_worker(&token);
            }
            IngestOutcome::DuplicateSuppressed(status) => {
                // Expected under duplicate delivery; not a failure.
                debug!(token = %token, status = status.label(), "duplicate exposure signal suppressed");
            }
        }

        SignalDisposition::Accepted(outcome)
    }

    fn wake_worker(&self, token: &TokenId) {
        if self.queue.send(token.clone()).is_err() {
            // Worker gone (shutdown); the startup sweep will find the token.
            debug!(token = %token, "work queue closed, token waits for next start");
        }
    }
}
