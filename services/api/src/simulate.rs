use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::Args;
use exposure_pipeline::config::{
    CircuitBreakerConfig, FailedTokenPolicy, IsolationConfig, PaymentPolicy,
};
use exposure_pipeline::error::AppError;
use exposure_pipeline::pipeline::circuit_breaker::{
    work_queue, ApprovalResponse, EvaluationWorker, PollToken, RemoteError,
    ScriptedCircuitBreakerApi,
};
use exposure_pipeline::pipeline::diagnostics::TracingDiagnostics;
use exposure_pipeline::pipeline::isolation::{
    payment_eligibility, IsolationStateMachine, MemoryIsolationStore, RiskOutcome,
};
use exposure_pipeline::pipeline::tokens::{MemoryTokenStore, TokenId, TokenStore};
use exposure_pipeline::pipeline::{
    ExposureSignal, SignalReceiver, ACTION_EXPOSURE_STATE_UPDATED, EXTRA_TOKEN,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Args, Debug, Default)]
pub(crate) struct SimulateArgs {
    /// Exposure token fed through the pipeline
    #[arg(long, default_value = "simulated-exposure-token")]
    pub(crate) token: String,
    /// Rounds of "not ready" the scripted risk service answers before
    /// resolving
    #[arg(long, default_value_t = 2)]
    pub(crate) pending_rounds: u32,
    /// Script a definitive no-risk outcome instead of risk detected
    #[arg(long)]
    pub(crate) no_risk: bool,
    /// Transient errors injected before the definitive outcome
    #[arg(long, default_value_t = 0)]
    pub(crate) transient_errors: u32,
    /// Contact date the scripted service reports (RFC 3339; defaults to
    /// two days ago)
    #[arg(long, value_parser = crate::infra::parse_timestamp)]
    pub(crate) exposure_date: Option<DateTime<Utc>>,
}

/// End-to-end walkthrough against a scripted risk service, printed step by
/// step. Everything runs in memory; nothing touches the network.
pub(crate) async fn run_simulation(args: SimulateArgs) -> Result<(), AppError> {
    let SimulateArgs {
        token,
        pending_rounds,
        no_risk,
        transient_errors,
        exposure_date,
    } = args;

    let exposure_date = exposure_date.unwrap_or_else(|| Utc::now() - ChronoDuration::days(2));

    let mut script: Vec<Result<ApprovalResponse, RemoteError>> = Vec::new();
    for round in 0..transient_errors {
        script.push(Err(RemoteError::Transport(format!(
            "simulated outage {}",
            round + 1
        ))));
    }
    for round in 0..pending_rounds {
        script.push(Ok(ApprovalResponse::Pending {
            poll_token: PollToken(format!("poll-{}", round + 1)),
            retry_after: Duration::from_millis(100),
        }));
    }
    let outcome = if no_risk {
        RiskOutcome::NoRisk
    } else {
        RiskOutcome::RiskDetected {
            exposure_date: Some(exposure_date),
        }
    };
    script.push(Ok(ApprovalResponse::Resolved(outcome)));

    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    let isolation = Arc::new(
        IsolationStateMachine::open(
            Arc::new(MemoryIsolationStore::new()),
            IsolationConfig {
                isolation_period_days: 11,
            },
        )
        .map_err(AppError::from)?,
    );
    let payment = PaymentPolicy {
        contact_qualifies: true,
        index_case_qualifies: true,
        minimum_remaining_hours: 24,
    };
    let risk_api = Arc::new(ScriptedCircuitBreakerApi::new(script));
    let worker = Arc::new(EvaluationWorker::new(
        store.clone(),
        risk_api.clone(),
        isolation.clone(),
        Arc::new(TracingDiagnostics),
        CircuitBreakerConfig {
            max_attempts: 8,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(2),
            worker_count: 2,
        },
    ));
    let (work_sender, work_receiver) = work_queue();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(worker.run(work_receiver, shutdown_rx));
    let receiver = SignalReceiver::new(
        store.clone(),
        work_sender,
        FailedTokenPolicy::ReingestOnSignal,
    );

    println!("Exposure notification pipeline simulation");
    println!(
        "Scripted risk service: {} transient error(s), {} pending round(s), then {}",
        transient_errors,
        pending_rounds,
        if no_risk { "no risk" } else { "risk detected" }
    );

    println!("\nStep 1: signal with a non-matching action (must be a no-op)");
    let wrong = ExposureSignal::new("com.example.BOOT_COMPLETED").with_extra(EXTRA_TOKEN, &token);
    println!("- disposition: {:?}", receiver.on_signal(&wrong, Utc::now()));

    println!("\nStep 2: exposure state updated signal, delivered twice");
    let signal =
        ExposureSignal::new(ACTION_EXPOSURE_STATE_UPDATED).with_extra(EXTRA_TOKEN, &token);
    println!("- first delivery:  {:?}", receiver.on_signal(&signal, Utc::now()));
    println!("- second delivery: {:?}", receiver.on_signal(&signal, Utc::now()));

    println!("\nStep 3: circuit-breaker evaluation");
    let id = TokenId(token.clone());
    let mut final_token = None;
    for _ in 0..100 {
        if let Some(current) = store.get(&id).map_err(AppError::from)? {
            if current.status.is_terminal() {
                final_token = Some(current);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let final_token = final_token.ok_or_else(|| {
        AppError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "evaluation did not finish in time",
        ))
    })?;
    println!(
        "- token {}: status {}, attempts {}, remote submissions {}, polls {}",
        final_token.id,
        final_token.status.label(),
        final_token.attempts,
        risk_api.submissions(),
        risk_api.polls(),
    );

    let now = Utc::now();
    let state = isolation.current_state(now);
    println!("\nStep 4: isolation state");
    println!("- state: {}", state.label());
    if let Some(end) = state.end() {
        println!("- isolating until: {end}");
    }

    println!("\nStep 5: payment eligibility");
    println!(
        "- {}",
        payment_eligibility(&state, now, &payment).label()
    );

    shutdown_tx.send(true).ok();
    run.await.ok();
    Ok(())
}
