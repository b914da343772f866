//! The exposure notification processing pipeline.
//!
//! Signals from the platform notification service become durable tokens
//! ([`tokens`]), a bounded worker drives each token through the remote
//! risk-evaluation protocol ([`circuit_breaker`]), and definitive outcomes
//! feed the isolation state machine and the payment gate ([`isolation`]).

pub mod circuit_breaker;
pub mod diagnostics;
pub mod isolation;
mod receiver;
pub mod tokens;

#[cfg(test)]
mod tests;

pub use receiver::{
    ExposureSignal, SignalDisposition, SignalReceiver, ACTION_EXPOSURE_STATE_UPDATED, EXTRA_TOKEN,
};
