use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::pipeline::isolation::RiskOutcome;
use crate::pipeline::tokens::TokenId;

use super::api::{ApprovalResponse, CircuitBreakerApi, PollToken, RemoteError};

const REQUEST_PATH: &str = "circuit-breaker/exposure-notification/request";
const RESOLUTION_PATH: &str = "circuit-breaker/exposure-notification/resolution";
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Production client for the remote risk-evaluation service.
///
/// The per-call deadline is enforced by the worker; the client-level timeout
/// is a backstop for connections that hang below it.
pub struct HttpCircuitBreakerApi {
    client: Client,
    base_url: String,
}

impl HttpCircuitBreakerApi {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout.saturating_mul(2))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn map_body(&self, body: ApprovalBody) -> Result<ApprovalResponse, RemoteError> {
        match body.approval {
            Approval::Yes => Ok(ApprovalResponse::Resolved(RiskOutcome::RiskDetected {
                exposure_date: body.exposure_date,
            })),
            Approval::No => Ok(ApprovalResponse::Resolved(RiskOutcome::NoRisk)),
            Approval::Pending => {
                let poll_token = body.approval_token.ok_or_else(|| {
                    RemoteError::Protocol("pending approval without approval_token".to_string())
                })?;
                let retry_after = body
                    .retry_after_seconds
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                Ok(ApprovalResponse::Pending {
                    poll_token: PollToken(poll_token),
                    retry_after,
                })
            }
        }
    }

    async fn decode(&self, response: reqwest::Response) -> Result<ApprovalResponse, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Transport(format!(
                "risk service answered {status}"
            )));
        }
        let body = response
            .json::<ApprovalBody>()
            .await
            .map_err(|err| RemoteError::Protocol(err.to_string()))?;
        self.map_body(body)
    }
}

#[async_trait]
impl CircuitBreakerApi for HttpCircuitBreakerApi {
    async fn request_approval(&self, token: &TokenId) -> Result<ApprovalResponse, RemoteError> {
        let url = format!("{}/{REQUEST_PATH}", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&ApprovalRequest {
                token: token.0.clone(),
            })
            .send()
            .await
            .map_err(RemoteError::from)?;
        self.decode(response).await
    }

    async fn poll(&self, poll_token: &PollToken) -> Result<ApprovalResponse, RemoteError> {
        let url = format!("{}/{RESOLUTION_PATH}/{}", self.base_url, poll_token.0);
        let response = self.client.get(url).send().await.map_err(RemoteError::from)?;
        self.decode(response).await
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() {
            RemoteError::Protocol(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct ApprovalRequest {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ApprovalBody {
    approval: Approval,
    #[serde(default)]
    approval_token: Option<String>,
    #[serde(default)]
    retry_after_seconds: Option<u64>,
    #[serde(default)]
    exposure_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Approval {
    Yes,
    No,
    Pending,
}
