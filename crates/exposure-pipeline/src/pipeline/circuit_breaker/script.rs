use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::pipeline::isolation::RiskOutcome;
use crate::pipeline::tokens::TokenId;

use super::api::{ApprovalResponse, CircuitBreakerApi, PollToken, RemoteError};

/// Deterministic stand-in for the remote risk service: answers from a fixed
/// script (shared across tokens), then keeps answering `NoRisk`. Backs the
/// `simulate` command and the test suites.
pub struct ScriptedCircuitBreakerApi {
    script: Mutex<VecDeque<Result<ApprovalResponse, RemoteError>>>,
    submissions: AtomicU32,
    polls: AtomicU32,
}

impl ScriptedCircuitBreakerApi {
    pub fn new(script: Vec<Result<ApprovalResponse, RemoteError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            submissions: AtomicU32::new(0),
            polls: AtomicU32::new(0),
        }
    }

    fn next(&self) -> Result<ApprovalResponse, RemoteError> {
        self.script
            .lock()
            .expect("script mutex poisoned")
            .pop_front()
            .unwrap_or(Ok(ApprovalResponse::Resolved(RiskOutcome::NoRisk)))
    }

    /// Initial submissions seen so far.
    pub fn submissions(&self) -> u32 {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Poll rounds seen so far.
    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CircuitBreakerApi for ScriptedCircuitBreakerApi {
    async fn request_approval(&self, _token: &TokenId) -> Result<ApprovalResponse, RemoteError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.next()
    }

    async fn poll(&self, _poll_token: &PollToken) -> Result<ApprovalResponse, RemoteError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.next()
    }
}
