//! HTTP client for the banking/fiscal provider API
//!
//! Creation and status-check calls only; request/response shapes beyond
//! status codes are opaque. Access tokens are cached so repeated polls do
//! not hammer the token endpoint.

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::operation::{OperationKind, OperationStatus};

const TOKEN_CACHE_KEY: &str = "access_token";

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The consent/credential is stale; requires user action, never an
    /// automatic retry
    #[error("provider authorization expired, reconnection required")]
    NeedsReauthorization,
    #[error("provider API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("provider transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Result of one status check; safe to request repeatedly
#[derive(Debug, Clone)]
pub struct StatusCheckResponse {
    pub is_terminal: bool,
    pub status: String,
    pub result_payload: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

/// Provider acknowledgement of a newly created operation
#[derive(Debug, Clone)]
pub struct ProviderOperation {
    pub operation_id: String,
    pub initial_status: Option<String>,
}

/// Seam for the poll worker: anything that can answer a status check
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn check_status(&self, operation_id: &str) -> Result<StatusCheckResponse, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct TokenWire {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CreateWire {
    #[serde(alias = "id", alias = "operationId")]
    operation_id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusWire {
    status: String,
    #[serde(default, alias = "isTerminal")]
    is_terminal: Option<bool>,
    #[serde(default, alias = "result", alias = "resultPayload")]
    result_payload: Option<serde_json::Value>,
    #[serde(default, alias = "errorMessage")]
    error_message: Option<String>,
}

impl StatusWire {
    fn into_response(self) -> StatusCheckResponse {
        // Providers that omit the terminal flag still report a status we
        // can classify
        let is_terminal = self.is_terminal.unwrap_or_else(|| {
            OperationStatus::normalize(&self.status)
                .map(|s| s.is_terminal())
                .unwrap_or(false)
        });

        StatusCheckResponse {
            is_terminal,
            status: self.status,
            result_payload: self.result_payload,
            error_message: self.error_message,
        }
    }
}

#[derive(Clone)]
pub struct ProviderApiService {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token_cache: Cache<String, String>,
}

impl ProviderApiService {
    pub fn new(base_url: String, client_id: String, client_secret: String) -> Self {
        let token_cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(3300)) // Refresh before the usual 1h expiry
            .build();

        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap(),
            base_url,
            client_id,
            client_secret,
            token_cache,
        }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.token_cache.get(TOKEN_CACHE_KEY).await {
            return Ok(token);
        }

        tracing::debug!("Fetching new provider access token");

        let response = self
            .client
            .post(format!("{}/oauth/token", self.base_url))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN
        {
            return Err(ProviderError::NeedsReauthorization);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let token: TokenWire = response.json().await?;
        self.token_cache
            .insert(TOKEN_CACHE_KEY.to_string(), token.access_token.clone())
            .await;

        Ok(token.access_token)
    }

    /// Submit a new operation to the provider
    pub async fn create_operation(
        &self,
        kind: OperationKind,
        parameters: &serde_json::Value,
    ) -> Result<ProviderOperation, ProviderError> {
        let token = self.access_token().await?;
        let url = format!("{}/v1/{}", self.base_url, kind.provider_path());

        tracing::info!("Creating {} operation with provider", kind);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .header("x-request-id", uuid::Uuid::new_v4().to_string())
            .json(parameters)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN
        {
            return Err(ProviderError::NeedsReauthorization);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let wire: CreateWire = response.json().await?;

        Ok(ProviderOperation {
            operation_id: wire.operation_id,
            initial_status: wire.status,
        })
    }
}

#[async_trait]
impl StatusSource for ProviderApiService {
    async fn check_status(&self, operation_id: &str) -> Result<StatusCheckResponse, ProviderError> {
        let token = self.access_token().await?;
        let url = format!("{}/v1/operations/{}", self.base_url, operation_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .header("x-request-id", uuid::Uuid::new_v4().to_string())
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN
        {
            return Err(ProviderError::NeedsReauthorization);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let wire: StatusWire = response.json().await?;
        let check = wire.into_response();

        tracing::debug!(
            "Status check for {}: {} (terminal: {})",
            operation_id,
            check.status,
            check.is_terminal
        );

        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_terminal_flag_passthrough() {
        let wire: StatusWire = serde_json::from_str(
            r#"{"status": "PROCESSING", "isTerminal": false}"#,
        )
        .unwrap();
        let check = wire.into_response();
        assert!(!check.is_terminal);
        assert_eq!(check.status, "PROCESSING");
    }

    #[test]
    fn test_status_wire_terminal_inferred_from_status() {
        let wire: StatusWire = serde_json::from_str(
            r#"{"status": "PAYMENT_PAID", "result": {"endToEndId": "E123"}}"#,
        )
        .unwrap();
        let check = wire.into_response();
        assert!(check.is_terminal);
        assert!(check.result_payload.is_some());
    }

    #[test]
    fn test_status_wire_unknown_status_not_terminal() {
        let wire: StatusWire =
            serde_json::from_str(r#"{"status": "SOMETHING_NEW"}"#).unwrap();
        assert!(!wire.into_response().is_terminal);
    }

    #[test]
    fn test_create_wire_id_aliases() {
        let wire: CreateWire =
            serde_json::from_str(r#"{"operationId": "op-1", "status": "CREATED"}"#).unwrap();
        assert_eq!(wire.operation_id, "op-1");
        assert_eq!(wire.status.as_deref(), Some("CREATED"));
    }
}
