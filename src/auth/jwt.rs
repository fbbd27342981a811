use crate::error::AppError;
use crate::health::{HealthCheckResult, HealthChecker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Only the HMAC family is supported; the configured secret is a shared key.
pub fn parse_algorithm(alg: &str) -> Result<Algorithm, AppError> {
    let algorithm = Algorithm::from_str(alg)
        .map_err(|_| AppError::Internal(format!("Unsupported JWT algorithm: {}", alg)))?;
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        other => Err(AppError::Internal(format!(
            "JWT algorithm {:?} requires key material this service does not carry",
            other
        ))),
    }
}

/// Claims carried by session tokens issued at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    pub sub: i64, // Database user ID
    pub iat: usize,
    pub exp: usize,
}

impl AuthClaims {
    pub fn new(user_id: i64, expires_in_seconds: u64) -> Self {
        let now = Utc::now().timestamp() as usize;
        Self {
            sub: user_id,
            iat: now,
            exp: now + expires_in_seconds as usize,
        }
    }

    pub fn is_expired(&self) -> bool {
        let now = Utc::now().timestamp() as usize;
        self.exp <= now
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp as i64, 0).unwrap_or_else(Utc::now)
    }
}

/// JWT service trait for dependency injection and testing
#[async_trait]
pub trait JwtService: Send + Sync {
    /// Create a session token from claims
    fn create_token(&self, claims: &AuthClaims) -> Result<String, AppError>;

    /// Validate a session token and return its claims
    fn validate_token(&self, token: &str) -> Result<AuthClaims, AppError>;

    /// Get algorithm used by this service
    fn algorithm(&self) -> Algorithm;
}

#[derive(Clone)]
pub struct JwtServiceImpl {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtServiceImpl {
    pub fn new(secret: &str, algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
        }
    }

    /// Create a health checker for this JWT service
    pub fn health_checker(&self) -> Arc<JwtHealthChecker> {
        Arc::new(JwtHealthChecker {
            service: self.clone(),
        })
    }
}

#[async_trait]
impl JwtService for JwtServiceImpl {
    fn create_token(&self, claims: &AuthClaims) -> Result<String, AppError> {
        let header = Header::new(self.algorithm);
        encode(&header, claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    fn validate_token(&self, token: &str) -> Result<AuthClaims, AppError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.leeway = 0;

        let token_data = decode::<AuthClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

        Ok(token_data.claims)
    }

    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

/// Health checker that exercises a token round trip.
pub struct JwtHealthChecker {
    service: JwtServiceImpl,
}

#[async_trait]
impl HealthChecker for JwtHealthChecker {
    fn name(&self) -> &str {
        "jwt"
    }

    async fn check(&self) -> HealthCheckResult {
        let claims = AuthClaims::new(0, 60);
        match self
            .service
            .create_token(&claims)
            .and_then(|token| self.service.validate_token(&token))
        {
            Ok(_) => HealthCheckResult::healthy(),
            Err(e) => HealthCheckResult::unhealthy(format!("JWT round trip failed: {}", e)),
        }
    }

    fn info(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({"algorithm": format!("{:?}", self.service.algorithm)}))
    }
}
