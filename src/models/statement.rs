//! Typed result payloads attached to completed operations

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One statement line reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementEntry {
    pub date: NaiveDate,
    #[serde(alias = "memo")]
    pub description: String,
    #[serde(alias = "value")]
    pub amount: Decimal,
    #[serde(alias = "type")]
    pub entry_type: EntryType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    #[serde(alias = "CREDIT", alias = "C")]
    Credit,
    #[serde(alias = "DEBIT", alias = "D")]
    Debit,
}

/// Result payload of a completed statement request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    pub entries: Vec<StatementEntry>,
}

/// Result payload of a settled payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_to_end_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<serde_json::Value>,
}
