use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::health::{HealthCheckResult, HealthChecker};

pub mod factory;
pub mod memory;
pub mod migrations;
pub mod redis;
pub mod sqlite;

pub use factory::StorageFactory;

/// Prefix used for platform user ids that were filled in manually instead of
/// resolved from the platform. Accounts carrying one cannot be queried.
pub const MANUAL_ID_PREFIX: &str = "manual-";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Not found")]
    NotFound,
    #[error("Database error: {0}")]
    Database(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Supported social platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    Instagram,
    Linkedin,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "INSTAGRAM",
            Platform::Linkedin => "LINKEDIN",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "instagram" => Ok(Platform::Instagram),
            "linkedin" => Ok(Platform::Linkedin),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Connection state of a social account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Expired,
    Revoked,
    Error,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Expired => "EXPIRED",
            AccountStatus::Revoked => "REVOKED",
            AccountStatus::Error => "ERROR",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(AccountStatus::Active),
            "EXPIRED" => Ok(AccountStatus::Expired),
            "REVOKED" => Ok(AccountStatus::Revoked),
            "ERROR" => Ok(AccountStatus::Error),
            other => Err(format!("unknown account status: {other}")),
        }
    }
}

/// Pending OAuth authorization bound to a CSRF state token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateData {
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Application user record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted connection to a social platform account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SocialAccountRecord {
    pub id: String,
    pub user_id: i64,
    pub platform: Platform,
    pub platform_user_id: String,
    pub platform_username: Option<String>,
    pub platform_display_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub status: AccountStatus,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SocialAccountRecord {
    /// False when the platform user id is a generated placeholder rather than
    /// a real platform identifier.
    pub fn has_resolved_identity(&self) -> bool {
        !self.platform_user_id.is_empty() && !self.platform_user_id.starts_with(MANUAL_ID_PREFIX)
    }
}

/// The identity triple every account is unique on.
#[derive(Clone, Debug)]
pub struct AccountIdentity {
    pub user_id: i64,
    pub platform: Platform,
    pub platform_user_id: String,
}

/// Fields written by a successful OAuth callback. The upsert replaces
/// credential and profile fields, resets status to ACTIVE and clears any
/// previous error message.
#[derive(Clone, Debug)]
pub struct AccountUpsert {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub platform_username: Option<String>,
    pub platform_display_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub metadata: serde_json::Value,
}

/// Credential update applied after a successful token refresh.
/// `refresh_token: None` keeps the currently stored refresh token.
#[derive(Clone, Debug)]
pub struct TokenUpdate {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// Cache storage trait for TTL-based data (Redis or in-memory).
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Store a CSRF state token with TTL.
    async fn store_state(
        &self,
        key: &str,
        state: &StateData,
        ttl_seconds: u64,
    ) -> StorageResult<()>;

    /// Atomically remove and return a CSRF state token. Single-use consume:
    /// after this call the key is gone whether or not it existed.
    async fn take_state(&self, key: &str) -> StorageResult<Option<StateData>>;

    /// Health check for cache storage.
    async fn health_check(&self) -> StorageResult<()>;
}

/// Database storage trait for persistent data.
#[async_trait]
pub trait DatabaseStorage: Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> StorageResult<()>;

    /// Health check for database storage.
    async fn health_check(&self) -> StorageResult<()>;

    /// Create a user. Fails with `Constraint` when the email is taken.
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        display_name: Option<&str>,
    ) -> StorageResult<UserRecord>;

    /// Get user by email.
    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<UserRecord>>;

    /// Get user by id.
    async fn find_user_by_id(&self, id: i64) -> StorageResult<Option<UserRecord>>;

    /// Create or update the account matching `identity`. At most one record
    /// exists per (user_id, platform, platform_user_id); the write must be
    /// atomic with respect to concurrent callbacks for the same identity.
    async fn upsert_account(
        &self,
        identity: &AccountIdentity,
        fields: &AccountUpsert,
    ) -> StorageResult<SocialAccountRecord>;

    /// Get account by id.
    async fn find_account(&self, id: &str) -> StorageResult<Option<SocialAccountRecord>>;

    /// Get account by id, scoped to an owning user.
    async fn find_account_for_user(
        &self,
        id: &str,
        user_id: i64,
    ) -> StorageResult<Option<SocialAccountRecord>>;

    /// List all accounts owned by a user, newest first.
    async fn list_accounts_for_user(
        &self,
        user_id: i64,
    ) -> StorageResult<Vec<SocialAccountRecord>>;

    /// Store refreshed credentials, set status ACTIVE and clear the error
    /// message. Fails with `NotFound` for unknown ids.
    async fn update_account_tokens(
        &self,
        id: &str,
        update: &TokenUpdate,
    ) -> StorageResult<SocialAccountRecord>;

    /// Mark an account EXPIRED with the given error message.
    async fn mark_account_expired(&self, id: &str, error_message: &str) -> StorageResult<()>;

    /// Delete an account.
    async fn delete_account(&self, id: &str) -> StorageResult<()>;
}

/// Unified storage interface combining cache and database.
pub struct Storage {
    pub cache: Box<dyn CacheStorage>,
    pub database: Box<dyn DatabaseStorage>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    pub fn new(cache: Box<dyn CacheStorage>, database: Box<dyn DatabaseStorage>) -> Self {
        Self { cache, database }
    }

    /// Health check for all storage systems.
    pub async fn health_check(&self) -> StorageResult<()> {
        self.cache.health_check().await?;
        self.database.health_check().await?;
        Ok(())
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> StorageResult<()> {
        self.database.migrate().await
    }
}

/// Health checker implementation for storage.
pub struct StorageHealthChecker {
    storage: Arc<Storage>,
}

impl StorageHealthChecker {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl HealthChecker for StorageHealthChecker {
    async fn check(&self) -> HealthCheckResult {
        match self.storage.health_check().await {
            Ok(()) => HealthCheckResult::healthy(),
            Err(e) => HealthCheckResult::unhealthy(format!("Storage health check failed: {}", e)),
        }
    }

    fn name(&self) -> &str {
        "storage"
    }
}
