use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::pipeline::diagnostics::{DiagnosticEvent, DiagnosticsReporter};
use crate::pipeline::isolation::{IsolationStateMachine, RiskOutcome};
use crate::pipeline::tokens::{TokenId, TokenStore};

use super::api::{ApprovalResponse, CircuitBreakerApi, PollToken, RemoteError};
use super::backoff::backoff_delay;

/// Wake-up channel between the signal receiver and the worker. Sends never
/// block; the token store, not the channel, is the source of truth.
pub type WorkSender = mpsc::UnboundedSender<TokenId>;
pub type WorkReceiver = mpsc::UnboundedReceiver<TokenId>;

pub fn work_queue() -> (WorkSender, WorkReceiver) {
    mpsc::unbounded_channel()
}

/// Drives pending tokens through the remote risk-evaluation protocol.
///
/// Parallelism across token ids is bounded by `worker_count`; per-id mutual
/// exclusion comes from the store's claim lease, so duplicate queue entries
/// can never produce a second in-flight submission for the same token.
pub struct EvaluationWorker {
    store: Arc<dyn TokenStore>,
    api: Arc<dyn CircuitBreakerApi>,
    isolation: Arc<IsolationStateMachine>,
    diagnostics: Arc<dyn DiagnosticsReporter>,
    config: CircuitBreakerConfig,
}

impl EvaluationWorker {
    pub fn new(
        store: Arc<dyn TokenStore>,
        api: Arc<dyn CircuitBreakerApi>,
        isolation: Arc<IsolationStateMachine>,
        diagnostics: Arc<dyn DiagnosticsReporter>,
        config: CircuitBreakerConfig,
    ) -> Self {
        Self {
            store,
            api,
            isolation,
            diagnostics,
            config,
        }
    }

    /// Main loop: recover unfinished tokens, then consume wake-ups until the
    /// queue closes or shutdown is signalled. Returns once every in-flight
    /// evaluation has completed or abandoned its token.
    pub async fn run(self: Arc<Self>, mut queue: WorkReceiver, shutdown: watch::Receiver<bool>) {
        let semaphore = Arc::new(Semaphore::new(self.config.worker_count.max(1)));
        let mut tasks: JoinSet<()> = JoinSet::new();

        match self.store.pending_backlog() {
            Ok(backlog) => {
                if !backlog.is_empty() {
                    info!(count = backlog.len(), "resuming unfinished token evaluations");
                }
                for id in backlog {
                    Self::spawn_evaluation(&self, id, &semaphore, &mut tasks, &shutdown).await;
                }
            }
            Err(err) => error!(error = %err, "startup recovery sweep failed"),
        }

        let mut shutdown_rx = shutdown.clone();
        loop {
            tokio::select! {
                _ = wait_shutdown(&mut shutdown_rx) => break,
                received = queue.recv() => match received {
                    Some(id) => {
                        Self::spawn_evaluation(&self, id, &semaphore, &mut tasks, &shutdown).await;
                    }
                    None => break,
                },
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Give in-flight evaluations the chance to abandon cleanly.
        while tasks.join_next().await.is_some() {}
    }

    async fn spawn_evaluation(
        worker: &Arc<Self>,
        id: TokenId,
        semaphore: &Arc<Semaphore>,
        tasks: &mut JoinSet<()>,
        shutdown: &watch::Receiver<bool>,
    ) {
        let mut shutdown_rx = shutdown.clone();
        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = wait_shutdown(&mut shutdown_rx) => return,
        };

        let worker = Arc::clone(worker);
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            worker.evaluate(id, shutdown).await;
            drop(permit);
        });
    }

    /// One full evaluation sequence for a claimed token.
    async fn evaluate(&self, id: TokenId, shutdown: watch::Receiver<bool>) {
        let token = match self.store.claim(&id) {
            Ok(Some(token)) => token,
            Ok(None) => {
                // Expected when duplicate signals race; distinct from failure.
                debug!(token = %id, "concurrent duplicate evaluation suppressed");
                return;
            }
            Err(err) => {
                error!(token = %id, error = %err, "could not claim token for evaluation");
                return;
            }
        };

        let mut attempts = token.attempts;
        let mut poll_token: Option<PollToken> = None;

        loop {
            if attempts >= self.config.max_attempts {
                self.finish_failed(&id, attempts);
                return;
            }

            let exchange = async {
                match &poll_token {
                    Some(poll) => self.api.poll(poll).await,
                    None => self.api.request_approval(&id).await,
                }
            };

            let delay = match tokio::time::timeout(self.config.request_timeout, exchange).await {
                Ok(Ok(ApprovalResponse::Resolved(outcome))) => {
                    self.finish_resolved(&id, &outcome, attempts);
                    return;
                }
                Ok(Ok(ApprovalResponse::Pending {
                    poll_token: next,
                    retry_after,
                })) => {
                    poll_token = Some(next);
                    attempts = match self.count_attempt(&id) {
                        Some(total) => total,
                        None => return,
                    };
                    debug!(
                        token = %id,
                        attempts,
                        retry_after_ms = retry_after.as_millis() as u64,
                        "outcome not ready, honoring server poll delay"
                    );
                    retry_after
                }
                Ok(Err(err)) => {
                    if err.is_protocol() {
                        self.report(DiagnosticEvent::ProtocolError {
                            token: id.clone(),
                            detail: err.to_string(),
                        });
                    }
                    attempts = match self.count_attempt(&id) {
                        Some(total) => total,
                        None => return,
                    };
                    warn!(token = %id, attempts, error = %err, "transient risk service error, backing off");
                    backoff_delay(&self.config, attempts)
                }
                Err(_elapsed) => {
                    attempts = match self.count_attempt(&id) {
                        Some(total) => total,
                        None => return,
                    };
                    warn!(token = %id, attempts, "risk service call timed out, backing off");
                    backoff_delay(&self.config, attempts)
                }
            };

            let mut shutdown_rx = shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_shutdown(&mut shutdown_rx) => {
                    self.abandon(&id);
                    return;
                }
            }
        }
    }

    /// Outcome first, completion second: dying in between re-runs the
    /// evaluation on restart, and both the remote resubmission and the
    /// isolation merge are idempotent.
    fn finish_resolved(&self, id: &TokenId, outcome: &RiskOutcome, attempts: u32) {
        if let Err(err) = self.isolation.apply(outcome, Utc::now()) {
            error!(token = %id, error = %err, "could not apply risk outcome, leaving token for resume");
            self.abandon(id);
            return;
        }
        match self.store.complete(id) {
            Ok(()) => {
                let outcome_label = match outcome {
                    RiskOutcome::RiskDetected { .. } => "risk detected",
                    RiskOutcome::NoRisk => "no risk",
                };
                info!(token = %id, attempts, outcome = outcome_label, "token evaluation completed");
            }
            Err(err) => error!(token = %id, error = %err, "could not mark token completed"),
        }
    }

    fn finish_failed(&self, id: &TokenId, attempts: u32) {
        if let Err(err) = self.store.fail(id) {
            error!(token = %id, error = %err, "could not mark token failed");
            return;
        }
        self.report(DiagnosticEvent::AttemptsExhausted {
            token: id.clone(),
            attempts,
        });
    }

    fn count_attempt(&self, id: &TokenId) -> Option<u32> {
        match self.store.record_attempt(id) {
            Ok(total) => Some(total),
            Err(err) => {
                error!(token = %id, error = %err, "could not record evaluation attempt");
                self.abandon(id);
                None
            }
        }
    }

    fn abandon(&self, id: &TokenId) {
        if let Err(err) = self.store.release(id) {
            error!(token = %id, error = %err, "could not release token lease");
            return;
        }
        info!(token = %id, "evaluation abandoned, token will resume on next start");
    }

    fn report(&self, event: DiagnosticEvent) {
        if let Err(err) = self.diagnostics.report(event) {
            warn!(error = %err, "diagnostics report failed");
        }
    }
}

async fn wait_shutdown(rx: &mut watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
    // Sender dropped counts as shutdown.
}
