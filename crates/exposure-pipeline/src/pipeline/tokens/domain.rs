use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier issued by the platform exposure-notification service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(pub String);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TokenId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TokenStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Terminal statuses never change again without explicit re-ingestion.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Durable work item: one exposure signal awaiting or undergoing risk
/// evaluation. The id is unique within a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureToken {
    pub id: TokenId,
    pub received_at: DateTime<Utc>,
    pub status: TokenStatus,
    pub attempts: u32,
}

impl ExposureToken {
    pub fn pending(id: TokenId, received_at: DateTime<Utc>) -> Self {
        Self {
            id,
            received_at,
            status: TokenStatus::Pending,
            attempts: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(TokenStatus::Completed.is_terminal());
        assert!(TokenStatus::Failed.is_terminal());
        assert!(!TokenStatus::Pending.is_terminal());
        assert!(!TokenStatus::InProgress.is_terminal());
    }

    #[test]
    fn token_round_trips_through_json() {
        let token = ExposureToken {
            id: TokenId::from("tok-1"),
            received_at: "2026-03-01T08:30:00Z".parse().expect("valid timestamp"),
            status: TokenStatus::InProgress,
            attempts: 3,
        };
        let raw = serde_json::to_string(&token).expect("serializes");
        let back: ExposureToken = serde_json::from_str(&raw).expect("deserializes");
        assert_eq!(back, token);
    }
}
