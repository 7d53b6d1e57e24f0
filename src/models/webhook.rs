//! Webhook delivery payload DTOs
//!
//! Provider payload shapes are treated as opaque beyond the fields needed to
//! resolve and reconcile the operation; the raw body is always persisted.

use serde::{Deserialize, Serialize};

/// Incoming provider webhook body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Provider-issued operation identifier
    #[serde(default, alias = "operationId", alias = "request_id")]
    pub operation_id: Option<String>,
    /// Event name, e.g. "PAYMENT_PAID"
    #[serde(default)]
    pub event: Option<String>,
    /// Explicit status, used when the provider sends no event name
    #[serde(default)]
    pub status: Option<String>,
    /// Settlement date reported by the provider
    #[serde(default, alias = "effectiveDate")]
    pub effective_date: Option<chrono::NaiveDate>,
    /// End-to-end identifier of the settled payment
    #[serde(default, alias = "endToEndId")]
    pub end_to_end_id: Option<String>,
    /// Per-occurrence settlement details
    #[serde(default)]
    pub occurrences: Option<serde_json::Value>,
    /// Provider error description for failure events
    #[serde(default, alias = "errorMessage")]
    pub error_message: Option<String>,
}

impl WebhookPayload {
    /// The raw status to normalize: event name wins, explicit status is the
    /// fallback
    pub fn raw_status(&self) -> Option<&str> {
        self.event.as_deref().or(self.status.as_deref())
    }
}

/// Receipt acknowledgement; 200 is returned whether or not reconciliation
/// changed state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_status: Option<String>,
}
