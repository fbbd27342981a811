use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::health::{HealthCheckResult, HealthChecker};
use crate::storage::{Platform, SocialAccountRecord, StorageError};

pub mod instagram;
pub mod linkedin;
pub mod state;

pub use instagram::InstagramConnector;
pub use linkedin::LinkedInConnector;
pub use state::StateStore;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Invalid state parameter")]
    InvalidState,
    #[error("State parameter expired")]
    StateExpired,
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),
    #[error("Identity resolution failed: {0}")]
    IdentityResolution(String),
    #[error("Account not found")]
    AccountNotFound,
    #[error("No refresh token available for this account")]
    NoRefreshToken,
    #[error("{message}")]
    UnresolvedIdentity { message: String },
    #[error("Platform {0} is not supported for this operation")]
    UnsupportedPlatform(Platform),
    #[error("Platform error: {message}")]
    Platform { code: Option<i64>, message: String },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ConnectorError {
    /// True for the platform error code that signals an expired or
    /// invalidated access token (Graph API code 190).
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ConnectorError::Platform { code: Some(190), .. })
    }
}

/// One OAuth-connected platform. Implementations own the full connect and
/// refresh lifecycle for their platform.
#[async_trait]
pub trait Connector: Send + Sync {
    fn platform(&self) -> Platform;

    /// Build the provider authorization URL with a freshly issued CSRF state.
    async fn get_auth_url(&self, user_id: i64) -> Result<String, ConnectorError>;

    /// Complete the OAuth flow: consume the state, exchange the code,
    /// resolve the platform identity and persist the account.
    async fn handle_callback(
        &self,
        code: &str,
        state: &str,
    ) -> Result<SocialAccountRecord, ConnectorError>;

    /// Obtain fresh credentials for a stored account. On platform rejection
    /// the account is marked EXPIRED before the error propagates.
    async fn refresh_token(&self, account_id: &str)
    -> Result<SocialAccountRecord, ConnectorError>;
}

impl std::fmt::Debug for dyn Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Connector").field(&self.platform()).finish()
    }
}

/// Lookup table from platform to connector implementation.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<Platform, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.connectors.insert(connector.platform(), connector);
    }

    pub fn get(&self, platform: Platform) -> Result<Arc<dyn Connector>, ConnectorError> {
        self.connectors
            .get(&platform)
            .cloned()
            .ok_or(ConnectorError::UnsupportedPlatform(platform))
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.connectors.keys().copied().collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct GraphErrorBody {
    pub message: Option<String>,
    pub code: Option<i64>,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GraphErrorEnvelope {
    pub error: GraphErrorBody,
}

/// Decode a non-success platform response into a `Platform` error, keeping
/// the numeric error code when the body carries one.
pub async fn decode_platform_error(response: reqwest::Response) -> ConnectorError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<GraphErrorEnvelope>(&body) {
        Ok(envelope) => ConnectorError::Platform {
            code: envelope.error.code,
            message: envelope
                .error
                .message
                .unwrap_or_else(|| format!("HTTP {}", status)),
        },
        Err(_) => ConnectorError::Platform {
            code: None,
            message: format!("HTTP {}: {}", status, body),
        },
    }
}

/// Health checker that verifies connector credentials are configured.
pub struct ConnectorHealthChecker {
    name: String,
    platform: Platform,
    credentials_configured: bool,
}

impl ConnectorHealthChecker {
    pub fn new(platform: Platform, client_id: &str, client_secret: &str) -> Self {
        Self {
            name: format!("oauth_{}", platform.as_str().to_lowercase()),
            platform,
            credentials_configured: !client_id.is_empty() && !client_secret.is_empty(),
        }
    }
}

#[async_trait]
impl HealthChecker for ConnectorHealthChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> HealthCheckResult {
        if self.credentials_configured {
            HealthCheckResult::healthy()
        } else {
            HealthCheckResult::degraded(format!(
                "{} client credentials are not configured",
                self.platform
            ))
        }
    }

    fn info(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({"platform": self.platform.as_str()}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_expired_detection() {
        let expired = ConnectorError::Platform {
            code: Some(190),
            message: "Error validating access token".to_string(),
        };
        assert!(expired.is_auth_expired());

        let other = ConnectorError::Platform {
            code: Some(100),
            message: "Unsupported get request".to_string(),
        };
        assert!(!other.is_auth_expired());

        let no_code = ConnectorError::Platform {
            code: None,
            message: "HTTP 500".to_string(),
        };
        assert!(!no_code.is_auth_expired());
    }

    #[test]
    fn test_graph_error_envelope_parsing() {
        let body = r#"{"error":{"message":"Error validating access token","type":"OAuthException","code":190}}"#;
        let envelope: GraphErrorEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.error.code, Some(190));
        assert_eq!(envelope.error.error_type.as_deref(), Some("OAuthException"));
    }

    #[test]
    fn test_registry_unknown_platform() {
        let registry = ConnectorRegistry::new();
        let err = registry.get(Platform::Instagram).unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::UnsupportedPlatform(Platform::Instagram)
        ));
    }

    #[tokio::test]
    async fn test_connector_health_checker() {
        let configured = ConnectorHealthChecker::new(Platform::Instagram, "id", "secret");
        assert!(matches!(
            configured.check().await.status,
            crate::health::HealthStatus::Healthy
        ));

        let missing = ConnectorHealthChecker::new(Platform::Linkedin, "", "");
        assert!(matches!(
            missing.check().await.status,
            crate::health::HealthStatus::Degraded
        ));
        assert_eq!(missing.name(), "oauth_linkedin");
    }
}
