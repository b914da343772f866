use chrono::{DateTime, Utc};
use exposure_pipeline::config::{PaymentPolicy, PipelineConfig};
use exposure_pipeline::error::AppError;
use exposure_pipeline::pipeline::circuit_breaker::WorkSender;
use exposure_pipeline::pipeline::isolation::{
    FileIsolationStore, IsolationStateMachine, IsolationStateStore, MemoryIsolationStore,
};
use exposure_pipeline::pipeline::tokens::{FileTokenStore, MemoryTokenStore, TokenStore};
use exposure_pipeline::pipeline::SignalReceiver;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Pipeline collaborators shared with the HTTP surface.
pub(crate) struct PipelineContext {
    pub(crate) receiver: SignalReceiver,
    pub(crate) store: Arc<dyn TokenStore>,
    pub(crate) isolation: Arc<IsolationStateMachine>,
    pub(crate) payment: PaymentPolicy,
    pub(crate) queue: WorkSender,
}

/// Durable store when a data directory is configured, memory otherwise.
pub(crate) fn open_token_store(config: &PipelineConfig) -> Result<Arc<dyn TokenStore>, AppError> {
    Ok(match &config.data_dir {
        Some(dir) => Arc::new(FileTokenStore::open(dir)?),
        None => Arc::new(MemoryTokenStore::new()),
    })
}

pub(crate) fn open_isolation_store(
    config: &PipelineConfig,
) -> Result<Arc<dyn IsolationStateStore>, AppError> {
    Ok(match &config.data_dir {
        Some(dir) => Arc::new(FileIsolationStore::open(dir)?),
        None => Arc::new(MemoryIsolationStore::new()),
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    raw.trim()
        .parse::<DateTime<Utc>>()
        .map_err(|err| format!("failed to parse '{raw}' as an RFC 3339 timestamp ({err})"))
}
