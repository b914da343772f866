use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::PaymentPolicy;

use super::domain::IsolationState;

/// Derived financial-support eligibility. Never stored; recomputed from the
/// resolved isolation state on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEligibility {
    Eligible,
    NotEligible,
}

impl PaymentEligibility {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::NotEligible => "not eligible",
        }
    }
}

/// Eligible iff a qualifying isolation reason is active and its window still
/// has at least the policy's minimum duration to run (boundary inclusive).
pub fn payment_eligibility(
    state: &IsolationState,
    now: DateTime<Utc>,
    policy: &PaymentPolicy,
) -> PaymentEligibility {
    let qualifying_end = match state {
        IsolationState::NotIsolating => None,
        IsolationState::ContactIsolation(window) => {
            policy.contact_qualifies.then_some(window.end)
        }
        IsolationState::IndexCaseIsolation(window) => {
            policy.index_case_qualifies.then_some(window.end)
        }
        IsolationState::ContactAndIndexIsolation {
            contact,
            index_case,
        } => {
            let contact_end = policy.contact_qualifies.then_some(contact.end);
            let index_end = policy.index_case_qualifies.then_some(index_case.end);
            contact_end.into_iter().chain(index_end).max()
        }
    };

    match qualifying_end {
        Some(end) if end - now >= policy.minimum_remaining() => PaymentEligibility::Eligible,
        _ => PaymentEligibility::NotEligible,
    }
}
