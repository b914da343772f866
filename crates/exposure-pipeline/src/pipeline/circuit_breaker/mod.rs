pub mod api;
mod backoff;
mod http;
mod script;
mod worker;

pub use api::{ApprovalResponse, CircuitBreakerApi, PollToken, RemoteError};
pub use http::HttpCircuitBreakerApi;
pub use script::ScriptedCircuitBreakerApi;
pub use worker::{work_queue, EvaluationWorker, WorkReceiver, WorkSender};
