use crate::pipeline::tokens::TokenId;

/// Observability events the pipeline must never swallow silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// The remote service answered with something uninterpretable. The
    /// evaluation keeps retrying; the event is for operators.
    ProtocolError { token: TokenId, detail: String },
    /// A token hit the attempt ceiling and was marked failed.
    AttemptsExhausted { token: TokenId, attempts: u32 },
}

/// Outbound hook for diagnostic events (log sink, alerting adapter, test
/// collector). Reporting failures never affect pipeline state.
pub trait DiagnosticsReporter: Send + Sync {
    fn report(&self, event: DiagnosticEvent) -> Result<(), DiagnosticsError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DiagnosticsError {
    #[error("diagnostics sink unavailable: {0}")]
    Unavailable(String),
}

/// Default reporter: structured log lines.
#[derive(Default)]
pub struct TracingDiagnostics;

impl DiagnosticsReporter for TracingDiagnostics {
    fn report(&self, event: DiagnosticEvent) -> Result<(), DiagnosticsError> {
        match event {
            DiagnosticEvent::ProtocolError { token, detail } => {
                tracing::warn!(token = %token, %detail, "risk service protocol error");
            }
            DiagnosticEvent::AttemptsExhausted { token, attempts } => {
                tracing::warn!(token = %token, attempts, "token failed after exhausting attempts");
            }
        }
        Ok(())
    }
}
