use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Definitive result of a remote risk evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RiskOutcome {
    RiskDetected {
        /// Contact date reported by the risk service, when it has one.
        exposure_date: Option<DateTime<Utc>>,
    },
    NoRisk,
}

/// Half-open interval during which an isolation reason is in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl IsolationWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// Monotone merge: the union never shrinks, and re-merging the same
    /// window is a no-op.
    pub fn merge(self, other: IsolationWindow) -> IsolationWindow {
        IsolationWindow {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// The independent isolation reasons tracked internally. The displayed
/// state is always resolved from these against an injected `now`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationReasons {
    pub contact: Option<IsolationWindow>,
    pub index_case: Option<IsolationWindow>,
}

impl IsolationReasons {
    pub fn resolve(&self, now: DateTime<Utc>) -> IsolationState {
        let contact = self.contact.filter(|window| window.contains(now));
        let index_case = self.index_case.filter(|window| window.contains(now));
        match (contact, index_case) {
            (Some(contact), Some(index_case)) => IsolationState::ContactAndIndexIsolation {
                contact,
                index_case,
            },
            (None, Some(window)) => IsolationState::IndexCaseIsolation(window),
            (Some(window), None) => IsolationState::ContactIsolation(window),
            (None, None) => IsolationState::NotIsolating,
        }
    }
}

/// Resolved self-isolation status. Exactly one variant governs at a time;
/// when both reasons are active the combined variant retains both windows
/// so expiry and payment checks can consult either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum IsolationState {
    NotIsolating,
    ContactIsolation(IsolationWindow),
    IndexCaseIsolation(IsolationWindow),
    ContactAndIndexIsolation {
        contact: IsolationWindow,
        index_case: IsolationWindow,
    },
}

impl IsolationState {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NotIsolating => "not isolating",
            Self::ContactIsolation(_) => "contact isolation",
            Self::IndexCaseIsolation(_) => "index case isolation",
            Self::ContactAndIndexIsolation { .. } => "contact and index case isolation",
        }
    }

    pub const fn is_isolating(&self) -> bool {
        !matches!(self, Self::NotIsolating)
    }

    /// Latest end across the active windows, if any.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::NotIsolating => None,
            Self::ContactIsolation(window) | Self::IndexCaseIsolation(window) => Some(window.end),
            Self::ContactAndIndexIsolation {
                contact,
                index_case,
            } => Some(contact.end.max(index_case.end)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> DateTime<Utc> {
        raw.parse().expect("valid timestamp")
    }

    fn window(start: &str, end: &str) -> IsolationWindow {
        IsolationWindow {
            start: at(start),
            end: at(end),
        }
    }

    #[test]
    fn merge_is_idempotent_and_monotone() {
        let first = window("2026-03-01T00:00:00Z", "2026-03-12T00:00:00Z");
        assert_eq!(first.merge(first), first);

        let longer = window("2026-03-02T00:00:00Z", "2026-03-14T00:00:00Z");
        let merged = first.merge(longer);
        assert_eq!(merged.start, first.start);
        assert_eq!(merged.end, longer.end);
        // A shorter window never shrinks the union.
        assert_eq!(merged.merge(first), merged);
    }

    #[test]
    fn resolve_prefers_combined_variant_when_both_active() {
        let now = at("2026-03-05T12:00:00Z");
        let reasons = IsolationReasons {
            contact: Some(window("2026-03-01T00:00:00Z", "2026-03-12T00:00:00Z")),
            index_case: Some(window("2026-03-04T00:00:00Z", "2026-03-10T00:00:00Z")),
        };
        match reasons.resolve(now) {
            IsolationState::ContactAndIndexIsolation { contact, index_case } => {
                assert_eq!(contact.end, at("2026-03-12T00:00:00Z"));
                assert_eq!(index_case.end, at("2026-03-10T00:00:00Z"));
            }
            other => panic!("expected combined isolation, got {other:?}"),
        }
    }

    #[test]
    fn expired_windows_resolve_to_not_isolating() {
        let reasons = IsolationReasons {
            contact: Some(window("2026-03-01T00:00:00Z", "2026-03-12T00:00:00Z")),
            index_case: None,
        };
        let resolved = reasons.resolve(at("2026-03-12T00:00:00Z"));
        assert_eq!(resolved, IsolationState::NotIsolating);
        assert!(!resolved.is_isolating());
    }

    #[test]
    fn combined_end_is_the_later_window() {
        let state = IsolationState::ContactAndIndexIsolation {
            contact: window("2026-03-01T00:00:00Z", "2026-03-12T00:00:00Z"),
            index_case: window("2026-03-04T00:00:00Z", "2026-03-15T00:00:00Z"),
        };
        assert_eq!(state.end(), Some(at("2026-03-15T00:00:00Z")));
    }
}
