use crate::cli::ServeArgs;
use crate::infra::{open_isolation_store, open_token_store, AppState, PipelineContext};
use crate::routes::with_pipeline_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use exposure_pipeline::config::AppConfig;
use exposure_pipeline::error::AppError;
use exposure_pipeline::pipeline::circuit_breaker::{
    work_queue, CircuitBreakerApi, EvaluationWorker, HttpCircuitBreakerApi,
};
use exposure_pipeline::pipeline::diagnostics::TracingDiagnostics;
use exposure_pipeline::pipeline::isolation::IsolationStateMachine;
use exposure_pipeline::pipeline::SignalReceiver;
use exposure_pipeline::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = open_token_store(&config.pipeline)?;
    let isolation = Arc::new(IsolationStateMachine::open(
        open_isolation_store(&config.pipeline)?,
        config.pipeline.isolation.clone(),
    )?);
    let risk_api: Arc<dyn CircuitBreakerApi> = Arc::new(HttpCircuitBreakerApi::new(
        &config.pipeline.risk_service_url,
        config.pipeline.circuit_breaker.request_timeout,
    ));

    let worker = Arc::new(EvaluationWorker::new(
        store.clone(),
        risk_api,
        isolation.clone(),
        Arc::new(TracingDiagnostics),
        config.pipeline.circuit_breaker.clone(),
    ));
    let (work_sender, work_receiver) = work_queue();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_task = tokio::spawn(worker.run(work_receiver, shutdown_rx));

    let receiver = SignalReceiver::new(
        store.clone(),
        work_sender.clone(),
        config.pipeline.failed_token_policy,
    );
    let context = Arc::new(PipelineContext {
        receiver,
        store,
        isolation,
        payment: config.pipeline.payment.clone(),
        queue: work_sender,
    });

    let app = with_pipeline_routes(context)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "exposure notification pipeline ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // HTTP surface is down; tell the worker to abandon in-flight
    // evaluations (tokens stay in progress and resume on next start).
    let _ = shutdown_tx.send(true);
    if let Err(err) = worker_task.await {
        error!(error = %err, "evaluation worker ended abnormally");
    }
    info!("pipeline shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "could not listen for shutdown signal");
    }
}
