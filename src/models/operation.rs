//! Operation kind and status enums plus request/response DTOs for the
//! async operation tracking endpoints

use serde::{Deserialize, Serialize};

/// Generic error body returned by handlers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Kinds of externally-fulfilled operations tracked by the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    StatementRequest,
    Payment,
}

impl OperationKind {
    /// Success end-state for this kind's state machine
    pub fn success_status(&self) -> OperationStatus {
        match self {
            OperationKind::StatementRequest => OperationStatus::Completed,
            OperationKind::Payment => OperationStatus::Paid,
        }
    }

    /// Provider API path segment for operation creation
    pub fn provider_path(&self) -> &'static str {
        match self {
            OperationKind::StatementRequest => "statement-requests",
            OperationKind::Payment => "payments",
        }
    }

    /// Statement requests are driven by polling; payments settle via webhook
    pub fn is_polled(&self) -> bool {
        matches!(self, OperationKind::StatementRequest)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::StatementRequest => write!(f, "statement_request"),
            OperationKind::Payment => write!(f, "payment"),
        }
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "statement_request" => Ok(OperationKind::StatementRequest),
            "payment" => Ok(OperationKind::Payment),
            _ => Err(format!("Unknown operation kind: {}", s)),
        }
    }
}

/// Normalized operation status, superset across kinds
///
/// Transitions only move forward: once a terminal status is stored the
/// record never leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Submitted to the provider, no acknowledgement yet
    Requesting,
    /// Accepted by the provider, waiting to be picked up
    Pending,
    /// Provider is working on it
    Processing,
    /// Payment accepted for a future effective date
    Scheduled,
    /// Payment settled
    Paid,
    /// Provider refused the operation
    Rejected,
    /// Cancelled before settlement
    Cancelled,
    /// Settled then returned
    Refunded,
    /// Statement request fulfilled
    Completed,
    /// Provider reported a definitive failure
    Error,
}

impl OperationStatus {
    /// Statuses from which no further transition is permitted
    pub const TERMINAL: [OperationStatus; 6] = [
        OperationStatus::Paid,
        OperationStatus::Rejected,
        OperationStatus::Cancelled,
        OperationStatus::Refunded,
        OperationStatus::Completed,
        OperationStatus::Error,
    ];

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// Terminal statuses that trigger the linked-entity side effect
    pub fn is_success(&self) -> bool {
        matches!(self, OperationStatus::Paid | OperationStatus::Completed)
    }

    /// Stored string forms of the terminal set, for store-level filters
    pub fn terminal_strings() -> Vec<String> {
        Self::TERMINAL.iter().map(|s| s.to_string()).collect()
    }

    /// Map a provider-reported status or event name to the normalized enum.
    ///
    /// Case-insensitive and tolerant of provider synonyms; returns `None`
    /// for names that map to nothing we track.
    pub fn normalize(raw: &str) -> Option<OperationStatus> {
        match raw.trim().to_uppercase().as_str() {
            "REQUESTING" | "CREATED" | "SUBMITTED" => Some(OperationStatus::Requesting),
            "PENDING" | "WAITING" | "QUEUED" | "RECEIVED" => Some(OperationStatus::Pending),
            "PROCESSING" | "IN_PROGRESS" | "IN_PROCESS" | "STARTED" => {
                Some(OperationStatus::Processing)
            }
            "SCHEDULED" | "PAYMENT_SCHEDULED" => Some(OperationStatus::Scheduled),
            "PAID" | "PAYMENT_PAID" | "LIQUIDATED" | "SETTLED" => Some(OperationStatus::Paid),
            "REJECTED" | "PAYMENT_REJECTED" | "DENIED" | "REFUSED" => {
                Some(OperationStatus::Rejected)
            }
            "CANCELLED" | "CANCELED" | "PAYMENT_CANCELLED" | "PAYMENT_CANCELED" => {
                Some(OperationStatus::Cancelled)
            }
            "REFUNDED" | "PAYMENT_REFUNDED" | "RETURNED" => Some(OperationStatus::Refunded),
            "COMPLETED" | "COMPLETE" | "DONE" | "CONCLUDED" | "FINISHED" => {
                Some(OperationStatus::Completed)
            }
            "ERROR" | "FAILED" | "FAILURE" => Some(OperationStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Requesting => write!(f, "requesting"),
            OperationStatus::Pending => write!(f, "pending"),
            OperationStatus::Processing => write!(f, "processing"),
            OperationStatus::Scheduled => write!(f, "scheduled"),
            OperationStatus::Paid => write!(f, "paid"),
            OperationStatus::Rejected => write!(f, "rejected"),
            OperationStatus::Cancelled => write!(f, "cancelled"),
            OperationStatus::Refunded => write!(f, "refunded"),
            OperationStatus::Completed => write!(f, "completed"),
            OperationStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationStatus::normalize(s).ok_or_else(|| format!("Unknown operation status: {}", s))
    }
}

/// Request to create a new provider operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOperationRequest {
    pub kind: OperationKind,
    /// Opaque parameters forwarded to the provider (account ref, payment
    /// details, statement date range)
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Internal business record to stamp on terminal success
    pub linked_entity_id: Option<String>,
}

/// Response for operation queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResponse {
    pub id: i32,
    pub operation_id: String,
    pub kind: String,
    pub status: String,
    pub linked_entity_id: Option<String>,
    pub attempts: i32,
    pub result_payload: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl From<crate::entities::operations::Model> for OperationResponse {
    fn from(model: crate::entities::operations::Model) -> Self {
        Self {
            id: model.id,
            operation_id: model.operation_id,
            kind: model.kind,
            status: model.status,
            linked_entity_id: model.linked_entity_id,
            attempts: model.attempts,
            result_payload: model.result_payload,
            error_message: model.error_message,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
            completed_at: model.completed_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

/// Operation status update pushed to WebSocket subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationEvent {
    pub operation_id: String,
    pub kind: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Timestamp in milliseconds
    pub timestamp: i64,
}

impl OperationEvent {
    pub fn from_model(model: &crate::entities::operations::Model) -> Self {
        Self {
            operation_id: model.operation_id.clone(),
            kind: model.kind.clone(),
            status: model.status.clone(),
            linked_entity_id: model.linked_entity_id.clone(),
            error: model.error_message.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Poll progress snapshot for UI binding; display only, never a scheduling
/// input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollProgressResponse {
    pub operation_id: String,
    pub active: bool,
    pub attempts: u32,
    pub max_attempts: u32,
    pub progress: f64,
    pub estimated_remaining_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_normalize_synonyms() {
        assert_eq!(
            OperationStatus::normalize("PAYMENT_PAID"),
            Some(OperationStatus::Paid)
        );
        assert_eq!(
            OperationStatus::normalize("paid"),
            Some(OperationStatus::Paid)
        );
        assert_eq!(
            OperationStatus::normalize("Canceled"),
            Some(OperationStatus::Cancelled)
        );
        assert_eq!(
            OperationStatus::normalize("in_progress"),
            Some(OperationStatus::Processing)
        );
        assert_eq!(OperationStatus::normalize("garbage"), None);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            OperationStatus::Requesting,
            OperationStatus::Pending,
            OperationStatus::Processing,
            OperationStatus::Scheduled,
            OperationStatus::Paid,
            OperationStatus::Rejected,
            OperationStatus::Cancelled,
            OperationStatus::Refunded,
            OperationStatus::Completed,
            OperationStatus::Error,
        ] {
            let parsed = OperationStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_terminal_set() {
        assert!(OperationStatus::Paid.is_terminal());
        assert!(OperationStatus::Error.is_terminal());
        assert!(!OperationStatus::Processing.is_terminal());
        assert!(!OperationStatus::Scheduled.is_terminal());

        assert!(OperationStatus::Paid.is_success());
        assert!(OperationStatus::Completed.is_success());
        assert!(!OperationStatus::Rejected.is_success());
    }

    #[test]
    fn test_kind_success_status() {
        assert_eq!(
            OperationKind::StatementRequest.success_status(),
            OperationStatus::Completed
        );
        assert_eq!(
            OperationKind::Payment.success_status(),
            OperationStatus::Paid
        );
        assert!(OperationKind::StatementRequest.is_polled());
        assert!(!OperationKind::Payment.is_polled());
    }
}
