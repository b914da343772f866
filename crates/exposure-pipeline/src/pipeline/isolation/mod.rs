pub mod domain;
mod payment;
mod state_machine;
pub mod store;

pub use domain::{IsolationReasons, IsolationState, IsolationWindow, RiskOutcome};
pub use payment::{payment_eligibility, PaymentEligibility};
pub use state_machine::IsolationStateMachine;
pub use store::{FileIsolationStore, IsolationStateStore, IsolationStoreError, MemoryIsolationStore};
