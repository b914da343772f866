//! Core library for the exposure notification processing pipeline: durable
//! token ingestion, circuit-breaker risk evaluation, and the isolation /
//! payment-eligibility state.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod telemetry;
