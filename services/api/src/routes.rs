use crate::infra::{AppState, PipelineContext};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use exposure_pipeline::error::AppError;
use exposure_pipeline::pipeline::isolation::{payment_eligibility, IsolationState};
use exposure_pipeline::pipeline::tokens::{ExposureToken, IngestOutcome};
use exposure_pipeline::pipeline::{ExposureSignal, SignalDisposition, EXTRA_TOKEN};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct SignalRequest {
    pub(crate) action: String,
    #[serde(default)]
    pub(crate) token: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct IsolationStateResponse {
    pub(crate) at: DateTime<Utc>,
    #[serde(flatten)]
    pub(crate) state: IsolationState,
    pub(crate) isolating: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct TokenView {
    pub(crate) id: String,
    pub(crate) status: &'static str,
    pub(crate) attempts: u32,
    pub(crate) received_at: DateTime<Utc>,
}

impl From<ExposureToken> for TokenView {
    fn from(token: ExposureToken) -> Self {
        Self {
            id: token.id.0,
            status: token.status.label(),
            attempts: token.attempts,
            received_at: token.received_at,
        }
    }
}

pub(crate) fn with_pipeline_routes(context: Arc<PipelineContext>) -> Router {
    pipeline_router(context)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

/// Router builder exposing the ingest, query, and diagnostics endpoints.
pub(crate) fn pipeline_router(context: Arc<PipelineContext>) -> Router {
    Router::new()
        .route("/api/v1/exposure/signal", post(signal_handler))
        .route("/api/v1/isolation/state", get(isolation_state_handler))
        .route("/api/v1/isolation/payment", get(payment_handler))
        .route("/api/v1/tokens", get(tokens_handler))
        .route("/api/v1/tokens/requeue-failed", post(requeue_failed_handler))
        .with_state(context)
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Inbound-signal adapter for the platform broadcast.
pub(crate) async fn signal_handler(
    State(context): State<Arc<PipelineContext>>,
    Json(payload): Json<SignalRequest>,
) -> Response {
    let mut signal = ExposureSignal::new(&payload.action);
    if let Some(token) = payload.token.as_deref() {
        signal = signal.with_extra(EXTRA_TOKEN, token);
    }

    match context.receiver.on_signal(&signal, Utc::now()) {
        SignalDisposition::Ignored => {
            let payload = json!({ "disposition": "ignored" });
            (StatusCode::OK, Json(payload)).into_response()
        }
        SignalDisposition::Discarded => {
            let payload = json!({ "disposition": "discarded" });
            (StatusCode::OK, Json(payload)).into_response()
        }
        SignalDisposition::Accepted(outcome) => {
            let payload = json!({
                "disposition": "accepted",
                "ingest": ingest_label(&outcome),
            });
            (StatusCode::ACCEPTED, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn isolation_state_handler(
    State(context): State<Arc<PipelineContext>>,
) -> Json<IsolationStateResponse> {
    let now = Utc::now();
    let state = context.isolation.current_state(now);
    Json(IsolationStateResponse {
        at: now,
        isolating: state.is_isolating(),
        state,
    })
}

pub(crate) async fn payment_handler(
    State(context): State<Arc<PipelineContext>>,
) -> Json<serde_json::Value> {
    let now = Utc::now();
    let state = context.isolation.current_state(now);
    let eligibility = payment_eligibility(&state, now, &context.payment);
    Json(json!({
        "at": now,
        "eligibility": eligibility,
        "isolation_state": state.label(),
    }))
}

/// Diagnostics: failed tokens stay visible here, never silently dropped.
pub(crate) async fn tokens_handler(
    State(context): State<Arc<PipelineContext>>,
) -> Result<Json<Vec<TokenView>>, AppError> {
    let tokens = context.store.snapshot()?;
    Ok(Json(tokens.into_iter().map(TokenView::from).collect()))
}

pub(crate) async fn requeue_failed_handler(
    State(context): State<Arc<PipelineContext>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let requeued = context.store.requeue_failed()?;
    for id in &requeued {
        // A closed queue is fine: the startup sweep re-finds pending tokens.
        let _ = context.queue.send(id.clone());
    }
    let ids: Vec<String> = requeued.into_iter().map(|id| id.0).collect();
    Ok(Json(json!({ "requeued": ids })))
}

fn ingest_label(outcome: &IngestOutcome) -> &'static str {
    match outcome {
        IngestOutcome::Appended => "appended",
        IngestOutcome::Requeued => "requeued",
        IngestOutcome::DuplicateSuppressed(_) => "duplicate_suppressed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposure_pipeline::config::{FailedTokenPolicy, IsolationConfig, PaymentPolicy};
    use exposure_pipeline::pipeline::circuit_breaker::work_queue;
    use exposure_pipeline::pipeline::isolation::{
        IsolationStateMachine, IsolationWindow, MemoryIsolationStore,
    };
    use exposure_pipeline::pipeline::tokens::{MemoryTokenStore, TokenId, TokenStore};
    use exposure_pipeline::pipeline::{SignalReceiver, ACTION_EXPOSURE_STATE_UPDATED};
    use tower::ServiceExt;

    fn context() -> (Arc<PipelineContext>, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        let (sender, queue) = work_queue();
        // Keep the queue receiver alive for the test's duration.
        std::mem::forget(queue);
        let isolation = Arc::new(
            IsolationStateMachine::open(
                Arc::new(MemoryIsolationStore::new()),
                IsolationConfig {
                    isolation_period_days: 11,
                },
            )
            .expect("state machine opens"),
        );
        let receiver =
            SignalReceiver::new(store.clone(), sender.clone(), FailedTokenPolicy::ReingestOnSignal);
        let context = Arc::new(PipelineContext {
            receiver,
            store: store.clone(),
            isolation,
            payment: PaymentPolicy {
                contact_qualifies: true,
                index_case_qualifies: true,
                minimum_remaining_hours: 24,
            },
            queue: sender,
        });
        (context, store)
    }

    async fn read_json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&body).expect("json payload")
    }

    #[tokio::test]
    async fn signal_endpoint_accepts_matching_action() {
        let (context, store) = context();
        let request = SignalRequest {
            action: ACTION_EXPOSURE_STATE_UPDATED.to_string(),
            token: Some("T1".to_string()),
        };

        let response = signal_handler(State(context), Json(request)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = read_json_body(response).await;
        assert_eq!(body["disposition"], "accepted");
        assert_eq!(body["ingest"], "appended");
        assert!(store
            .get(&TokenId::from("T1"))
            .expect("get")
            .is_some());
    }

    #[tokio::test]
    async fn signal_endpoint_ignores_other_actions() {
        let (context, store) = context();
        let request = SignalRequest {
            action: "com.example.SOME_OTHER_ACTION".to_string(),
            token: Some("T1".to_string()),
        };

        let response = signal_handler(State(context), Json(request)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json_body(response).await;
        assert_eq!(body["disposition"], "ignored");
        assert!(store.snapshot().expect("snapshot").is_empty());
    }

    #[tokio::test]
    async fn signal_endpoint_discards_missing_token() {
        let (context, _store) = context();
        let request = SignalRequest {
            action: ACTION_EXPOSURE_STATE_UPDATED.to_string(),
            token: None,
        };

        let response = signal_handler(State(context), Json(request)).await;
        let body = read_json_body(response).await;
        assert_eq!(body["disposition"], "discarded");
    }

    #[tokio::test]
    async fn isolation_state_endpoint_reflects_active_window() {
        let (context, _store) = context();
        let now = Utc::now();
        context
            .isolation
            .record_index_case(
                IsolationWindow {
                    start: now - chrono::Duration::days(1),
                    end: now + chrono::Duration::days(5),
                },
                now,
            )
            .expect("record succeeds");

        let Json(body) = isolation_state_handler(State(context)).await;
        assert!(body.isolating);
        assert!(matches!(body.state, IsolationState::IndexCaseIsolation(_)));
    }

    #[tokio::test]
    async fn payment_endpoint_reports_eligibility() {
        let (context, _store) = context();
        let now = Utc::now();
        context
            .isolation
            .record_index_case(
                IsolationWindow {
                    start: now - chrono::Duration::days(1),
                    end: now + chrono::Duration::days(5),
                },
                now,
            )
            .expect("record succeeds");

        let Json(body) = payment_handler(State(context)).await;
        assert_eq!(body["eligibility"], "eligible");
        assert_eq!(body["isolation_state"], "index case isolation");
    }

    #[tokio::test]
    async fn payment_endpoint_not_eligible_without_isolation() {
        let (context, _store) = context();
        let Json(body) = payment_handler(State(context)).await;
        assert_eq!(body["eligibility"], "not_eligible");
    }

    #[tokio::test]
    async fn requeue_endpoint_returns_failed_tokens_to_pending() {
        let (context, store) = context();
        let id = TokenId::from("T1");
        store
            .ingest(id.clone(), Utc::now(), false)
            .expect("ingest succeeds");
        store.claim(&id).expect("claim").expect("token claimed");
        store.fail(&id).expect("fail succeeds");

        let Json(body) = requeue_failed_handler(State(context))
            .await
            .expect("requeue succeeds");
        assert_eq!(body["requeued"], json!(["T1"]));
    }

    #[tokio::test]
    async fn router_serves_token_diagnostics() {
        let (context, store) = context();
        store
            .ingest(TokenId::from("T1"), Utc::now(), false)
            .expect("ingest succeeds");

        let app = pipeline_router(context);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("GET")
                    .uri("/api/v1/tokens")
                    .body(axum::body::Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("router responds");

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json_body(response).await;
        assert_eq!(body[0]["id"], "T1");
        assert_eq!(body[0]["status"], "pending");
        assert_eq!(body[0]["attempts"], 0);
    }
}
