use super::{
    AccountIdentity, AccountStatus, AccountUpsert, CacheStorage, DatabaseStorage,
    SocialAccountRecord, StateData, StorageError, StorageResult, TokenUpdate, UserRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};
use uuid::Uuid;

/// TTL entry wrapper for cache data
#[derive(Clone, Debug)]
struct TtlEntry<T> {
    data: T,
    expires_at: DateTime<Utc>,
}

impl<T> TtlEntry<T> {
    fn new(data: T, ttl_seconds: u64) -> Self {
        Self {
            data,
            expires_at: Utc::now() + chrono::Duration::seconds(ttl_seconds as i64),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// In-memory cache storage implementation
pub struct MemoryCacheStorage {
    states: Arc<DashMap<String, TtlEntry<StateData>>>,
    cleanup_interval: Duration,
}

impl MemoryCacheStorage {
    pub fn new(cleanup_interval_seconds: u64) -> Self {
        let storage = Self {
            states: Arc::new(DashMap::new()),
            cleanup_interval: Duration::from_secs(cleanup_interval_seconds),
        };

        storage.start_cleanup_task();
        storage
    }

    fn start_cleanup_task(&self) {
        let states = self.states.clone();
        let interval = self.cleanup_interval;

        tokio::spawn(async move {
            loop {
                sleep(interval).await;
                states.retain(|_, entry| !entry.is_expired());
            }
        });
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn store_state(
        &self,
        key: &str,
        state: &StateData,
        ttl_seconds: u64,
    ) -> StorageResult<()> {
        self.states
            .insert(key.to_string(), TtlEntry::new(state.clone(), ttl_seconds));
        Ok(())
    }

    async fn take_state(&self, key: &str) -> StorageResult<Option<StateData>> {
        // remove() is the atomic consume: a second caller gets None.
        match self.states.remove(key) {
            Some((_, entry)) if !entry.is_expired() => Ok(Some(entry.data)),
            _ => Ok(None),
        }
    }

    async fn health_check(&self) -> StorageResult<()> {
        // Memory storage is always healthy
        Ok(())
    }
}

#[derive(Default)]
struct MemoryTables {
    users: HashMap<i64, UserRecord>,
    next_user_id: i64,
    accounts: HashMap<String, SocialAccountRecord>,
}

/// In-memory database storage implementation. A single lock serializes all
/// writes, so upserts for the same identity cannot interleave.
pub struct MemoryDatabaseStorage {
    tables: Mutex<MemoryTables>,
}

impl MemoryDatabaseStorage {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(MemoryTables {
                next_user_id: 1,
                ..Default::default()
            }),
        }
    }
}

impl Default for MemoryDatabaseStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseStorage for MemoryDatabaseStorage {
    async fn migrate(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        display_name: Option<&str>,
    ) -> StorageResult<UserRecord> {
        let mut tables = self.tables.lock().await;

        if tables.users.values().any(|u| u.email == email) {
            return Err(StorageError::Constraint(format!(
                "email already registered: {}",
                email
            )));
        }

        let id = tables.next_user_id;
        tables.next_user_id += 1;
        let now = Utc::now();
        let user = UserRecord {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            display_name: display_name.map(|s| s.to_string()),
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<UserRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: i64) -> StorageResult<Option<UserRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(&id).cloned())
    }

    async fn upsert_account(
        &self,
        identity: &AccountIdentity,
        fields: &AccountUpsert,
    ) -> StorageResult<SocialAccountRecord> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        let existing_id = tables
            .accounts
            .values()
            .find(|a| {
                a.user_id == identity.user_id
                    && a.platform == identity.platform
                    && a.platform_user_id == identity.platform_user_id
            })
            .map(|a| a.id.clone());

        let record = match existing_id {
            Some(id) => {
                let account = tables
                    .accounts
                    .get_mut(&id)
                    .ok_or(StorageError::NotFound)?;
                account.access_token = fields.access_token.clone();
                account.refresh_token = fields.refresh_token.clone();
                account.token_expires_at = fields.token_expires_at;
                account.platform_username = fields.platform_username.clone();
                account.platform_display_name = fields.platform_display_name.clone();
                account.profile_picture_url = fields.profile_picture_url.clone();
                account.metadata = fields.metadata.clone();
                account.status = AccountStatus::Active;
                account.error_message = None;
                account.updated_at = now;
                account.clone()
            }
            None => {
                let account = SocialAccountRecord {
                    id: Uuid::new_v4().to_string(),
                    user_id: identity.user_id,
                    platform: identity.platform,
                    platform_user_id: identity.platform_user_id.clone(),
                    platform_username: fields.platform_username.clone(),
                    platform_display_name: fields.platform_display_name.clone(),
                    profile_picture_url: fields.profile_picture_url.clone(),
                    access_token: fields.access_token.clone(),
                    refresh_token: fields.refresh_token.clone(),
                    token_expires_at: fields.token_expires_at,
                    status: AccountStatus::Active,
                    error_message: None,
                    metadata: fields.metadata.clone(),
                    created_at: now,
                    updated_at: now,
                };
                tables
                    .accounts
                    .insert(account.id.clone(), account.clone());
                account
            }
        };

        Ok(record)
    }

    async fn find_account(&self, id: &str) -> StorageResult<Option<SocialAccountRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables.accounts.get(id).cloned())
    }

    async fn find_account_for_user(
        &self,
        id: &str,
        user_id: i64,
    ) -> StorageResult<Option<SocialAccountRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .accounts
            .get(id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }

    async fn list_accounts_for_user(
        &self,
        user_id: i64,
    ) -> StorageResult<Vec<SocialAccountRecord>> {
        let tables = self.tables.lock().await;
        let mut accounts: Vec<_> = tables
            .accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(accounts)
    }

    async fn update_account_tokens(
        &self,
        id: &str,
        update: &TokenUpdate,
    ) -> StorageResult<SocialAccountRecord> {
        let mut tables = self.tables.lock().await;
        let account = tables
            .accounts
            .get_mut(id)
            .ok_or(StorageError::NotFound)?;

        account.access_token = update.access_token.clone();
        if let Some(refresh_token) = &update.refresh_token {
            account.refresh_token = Some(refresh_token.clone());
        }
        account.token_expires_at = update.token_expires_at;
        account.status = AccountStatus::Active;
        account.error_message = None;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn mark_account_expired(&self, id: &str, error_message: &str) -> StorageResult<()> {
        let mut tables = self.tables.lock().await;
        let account = tables
            .accounts
            .get_mut(id)
            .ok_or(StorageError::NotFound)?;
        account.status = AccountStatus::Expired;
        account.error_message = Some(error_message.to_string());
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_account(&self, id: &str) -> StorageResult<()> {
        let mut tables = self.tables.lock().await;
        tables
            .accounts
            .remove(id)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }
}
