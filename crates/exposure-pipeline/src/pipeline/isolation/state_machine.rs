use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::IsolationConfig;

use super::domain::{IsolationReasons, IsolationState, IsolationWindow, RiskOutcome};
use super::store::{IsolationStateStore, IsolationStoreError};

/// Owns the single shared isolation value. Every transition is one
/// read-modify-write under the lock, persisted before the lock is released,
/// so a circuit-breaker outcome and a concurrently self-reported index case
/// can never lose each other's update.
pub struct IsolationStateMachine {
    reasons: Mutex<IsolationReasons>,
    store: Arc<dyn IsolationStateStore>,
    config: IsolationConfig,
}

impl IsolationStateMachine {
    /// Load persisted reasons (or start clean) and wrap them.
    pub fn open(
        store: Arc<dyn IsolationStateStore>,
        config: IsolationConfig,
    ) -> Result<Self, IsolationStoreError> {
        let reasons = store.load()?.unwrap_or_default();
        Ok(Self {
            reasons: Mutex::new(reasons),
            store,
            config,
        })
    }

    /// Apply a definitive circuit-breaker outcome.
    ///
    /// `RiskDetected` opens (or monotonically extends) the contact-isolation
    /// window anchored on the reported contact date; repeated delivery of
    /// the same outcome leaves the end date unchanged. `NoRisk` changes
    /// nothing, whatever isolation is already in force.
    pub fn apply(
        &self,
        outcome: &RiskOutcome,
        now: DateTime<Utc>,
    ) -> Result<IsolationState, IsolationStoreError> {
        match outcome {
            RiskOutcome::NoRisk => Ok(self.current_state(now)),
            RiskOutcome::RiskDetected { exposure_date } => {
                let anchor = exposure_date.unwrap_or(now);
                let window = IsolationWindow {
                    start: anchor,
                    end: anchor + self.config.isolation_period(),
                };
                let mut reasons = self.reasons.lock().expect("isolation mutex poisoned");
                let merged = match reasons.contact {
                    Some(existing) => existing.merge(window),
                    None => window,
                };
                reasons.contact = Some(merged);
                self.store.save(&reasons)?;
                let state = reasons.resolve(now);
                info!(
                    isolation_until = %merged.end,
                    state = state.label(),
                    "risk detected, contact isolation window updated"
                );
                Ok(state)
            }
        }
    }

    /// Record an index-case isolation window from a locally-detected
    /// symptom or test event. Same monotone merge as contact isolation; an
    /// active contact window is never shortened.
    pub fn record_index_case(
        &self,
        window: IsolationWindow,
        now: DateTime<Utc>,
    ) -> Result<IsolationState, IsolationStoreError> {
        let mut reasons = self.reasons.lock().expect("isolation mutex poisoned");
        let merged = match reasons.index_case {
            Some(existing) => existing.merge(window),
            None => window,
        };
        reasons.index_case = Some(merged);
        self.store.save(&reasons)?;
        let state = reasons.resolve(now);
        info!(
            isolation_until = %merged.end,
            state = state.label(),
            "index case isolation window updated"
        );
        Ok(state)
    }

    /// Resolve the governing state at `now`. Pure read: expiry is computed
    /// here, never ticked by a timer.
    pub fn current_state(&self, now: DateTime<Utc>) -> IsolationState {
        self.reasons
            .lock()
            .expect("isolation mutex poisoned")
            .resolve(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::isolation::store::MemoryIsolationStore;

    fn machine() -> IsolationStateMachine {
        IsolationStateMachine::open(
            Arc::new(MemoryIsolationStore::new()),
            IsolationConfig {
                isolation_period_days: 11,
            },
        )
        .expect("state machine opens")
    }

    fn at(raw: &str) -> DateTime<Utc> {
        raw.parse().expect("valid timestamp")
    }

    #[test]
    fn risk_detected_opens_window_anchored_on_contact_date() {
        let machine = machine();
        let contact = at("2026-03-01T00:00:00Z");
        let now = at("2026-03-03T09:00:00Z");

        let state = machine
            .apply(
                &RiskOutcome::RiskDetected {
                    exposure_date: Some(contact),
                },
                now,
            )
            .expect("apply succeeds");

        match state {
            IsolationState::ContactIsolation(window) => {
                assert_eq!(window.start, contact);
                assert_eq!(window.end, at("2026-03-12T00:00:00Z"));
            }
            other => panic!("expected contact isolation, got {other:?}"),
        }
    }

    #[test]
    fn applying_same_outcome_twice_does_not_extend_the_window() {
        let machine = machine();
        let outcome = RiskOutcome::RiskDetected {
            exposure_date: Some(at("2026-03-01T00:00:00Z")),
        };

        let first = machine
            .apply(&outcome, at("2026-03-02T00:00:00Z"))
            .expect("apply succeeds");
        // Redelivery a day later, e.g. a resumed evaluation after restart.
        let second = machine
            .apply(&outcome, at("2026-03-03T00:00:00Z"))
            .expect("apply succeeds");

        assert_eq!(first.end(), second.end());
    }

    #[test]
    fn no_risk_leaves_existing_isolation_untouched() {
        let machine = machine();
        let now = at("2026-03-05T00:00:00Z");
        machine
            .record_index_case(
                IsolationWindow {
                    start: at("2026-03-04T00:00:00Z"),
                    end: at("2026-03-14T00:00:00Z"),
                },
                now,
            )
            .expect("record succeeds");

        let state = machine.apply(&RiskOutcome::NoRisk, now).expect("apply succeeds");
        assert!(matches!(state, IsolationState::IndexCaseIsolation(_)));
    }

    #[test]
    fn no_risk_with_no_prior_isolation_stays_not_isolating() {
        let machine = machine();
        let state = machine
            .apply(&RiskOutcome::NoRisk, at("2026-03-05T00:00:00Z"))
            .expect("apply succeeds");
        assert_eq!(state, IsolationState::NotIsolating);
    }

    #[test]
    fn index_case_window_is_not_shortened_by_new_contact_risk() {
        let machine = machine();
        let now = at("2026-03-05T00:00:00Z");
        machine
            .record_index_case(
                IsolationWindow {
                    start: at("2026-03-04T00:00:00Z"),
                    end: at("2026-03-20T00:00:00Z"),
                },
                now,
            )
            .expect("record succeeds");

        let state = machine
            .apply(
                &RiskOutcome::RiskDetected {
                    exposure_date: Some(at("2026-03-05T00:00:00Z")),
                },
                now,
            )
            .expect("apply succeeds");

        match state {
            IsolationState::ContactAndIndexIsolation { index_case, .. } => {
                assert_eq!(index_case.end, at("2026-03-20T00:00:00Z"));
            }
            other => panic!("expected combined isolation, got {other:?}"),
        }
    }

    #[test]
    fn state_survives_reload_through_the_store() {
        let store = Arc::new(MemoryIsolationStore::new());
        let config = IsolationConfig {
            isolation_period_days: 11,
        };
        let machine =
            IsolationStateMachine::open(store.clone(), config.clone()).expect("machine opens");
        machine
            .apply(
                &RiskOutcome::RiskDetected {
                    exposure_date: Some(at("2026-03-01T00:00:00Z")),
                },
                at("2026-03-02T00:00:00Z"),
            )
            .expect("apply succeeds");

        let reopened = IsolationStateMachine::open(store, config).expect("machine reopens");
        let state = reopened.current_state(at("2026-03-05T00:00:00Z"));
        assert!(matches!(state, IsolationState::ContactIsolation(_)));
    }
}
