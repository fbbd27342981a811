use super::{
    AccountIdentity, AccountStatus, AccountUpsert, DatabaseStorage, Platform,
    SocialAccountRecord, StorageError, StorageResult, TokenUpdate, UserRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite, migrate::MigrateDatabase, sqlite::SqliteRow};
use uuid::Uuid;

/// SQLite database storage implementation
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str) -> StorageResult<Self> {
        if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
            Sqlite::create_database(database_url)
                .await
                .map_err(|e| StorageError::Database(format!("Failed to create database: {}", e)))?;
        }

        // An in-memory database lives in a single connection; a larger pool
        // would see separate empty databases.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Database(format!("Failed to connect to database: {}", e)))?;

        Ok(Self { pool })
    }

    fn map_user_row(row: &SqliteRow) -> StorageResult<UserRecord> {
        Ok(UserRecord {
            id: row.get("id"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            display_name: row.get("display_name"),
            created_at: parse_timestamp(row.get("created_at"))?,
            updated_at: parse_timestamp(row.get("updated_at"))?,
        })
    }

    fn map_account_row(row: &SqliteRow) -> StorageResult<SocialAccountRecord> {
        let platform: String = row.get("platform");
        let status: String = row.get("status");
        let metadata: String = row.get("metadata");
        let token_expires_at: Option<String> = row.get("token_expires_at");

        Ok(SocialAccountRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            platform: platform
                .parse::<Platform>()
                .map_err(StorageError::Serialization)?,
            platform_user_id: row.get("platform_user_id"),
            platform_username: row.get("platform_username"),
            platform_display_name: row.get("platform_display_name"),
            profile_picture_url: row.get("profile_picture_url"),
            access_token: row.get("access_token"),
            refresh_token: row.get("refresh_token"),
            token_expires_at: token_expires_at.map(parse_timestamp).transpose()?,
            status: status
                .parse::<AccountStatus>()
                .map_err(StorageError::Serialization)?,
            error_message: row.get("error_message"),
            metadata: serde_json::from_str(&metadata)
                .map_err(|e| StorageError::Serialization(format!("Bad metadata JSON: {}", e)))?,
            created_at: parse_timestamp(row.get("created_at"))?,
            updated_at: parse_timestamp(row.get("updated_at"))?,
        })
    }
}

fn parse_timestamp(value: String) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("Bad timestamp '{}': {}", value, e)))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed"))
}

const ACCOUNT_COLUMNS: &str = "id, user_id, platform, platform_user_id, platform_username, \
     platform_display_name, profile_picture_url, access_token, refresh_token, \
     token_expires_at, status, error_message, metadata, created_at, updated_at";

#[async_trait]
impl DatabaseStorage for SqliteStorage {
    async fn migrate(&self) -> StorageResult<()> {
        super::migrations::run_sqlite_migrations(&self.pool).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("Health check failed: {}", e)))?;
        Ok(())
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        display_name: Option<&str>,
    ) -> StorageResult<UserRecord> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, display_name, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            RETURNING id, email, password_hash, display_name, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(display_name)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Constraint(format!("email already registered: {}", email))
            } else {
                StorageError::Database(format!("Failed to create user: {}", e))
            }
        })?;

        Self::map_user_row(&row)
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<UserRecord>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, display_name, created_at, updated_at FROM users WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("Failed to get user by email: {}", e)))?;

        row.as_ref().map(Self::map_user_row).transpose()
    }

    async fn find_user_by_id(&self, id: i64) -> StorageResult<Option<UserRecord>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, display_name, created_at, updated_at FROM users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("Failed to get user by ID: {}", e)))?;

        row.as_ref().map(Self::map_user_row).transpose()
    }

    async fn upsert_account(
        &self,
        identity: &AccountIdentity,
        fields: &AccountUpsert,
    ) -> StorageResult<SocialAccountRecord> {
        let now = Utc::now().to_rfc3339();
        let metadata = serde_json::to_string(&fields.metadata)
            .map_err(|e| StorageError::Serialization(format!("Bad metadata JSON: {}", e)))?;

        let sql = format!(
            r#"
            INSERT INTO social_accounts (
                id, user_id, platform, platform_user_id, platform_username,
                platform_display_name, profile_picture_url, access_token, refresh_token,
                token_expires_at, status, error_message, metadata, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'ACTIVE', NULL, ?11, ?12, ?12)
            ON CONFLICT (user_id, platform, platform_user_id)
            DO UPDATE SET
                platform_username = excluded.platform_username,
                platform_display_name = excluded.platform_display_name,
                profile_picture_url = excluded.profile_picture_url,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_expires_at = excluded.token_expires_at,
                status = 'ACTIVE',
                error_message = NULL,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(identity.user_id)
            .bind(identity.platform.as_str())
            .bind(&identity.platform_user_id)
            .bind(&fields.platform_username)
            .bind(&fields.platform_display_name)
            .bind(&fields.profile_picture_url)
            .bind(&fields.access_token)
            .bind(&fields.refresh_token)
            .bind(fields.token_expires_at.map(|t| t.to_rfc3339()))
            .bind(&metadata)
            .bind(&now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("Failed to upsert account: {}", e)))?;

        Self::map_account_row(&row)
    }

    async fn find_account(&self, id: &str) -> StorageResult<Option<SocialAccountRecord>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM social_accounts WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("Failed to get account: {}", e)))?;

        row.as_ref().map(Self::map_account_row).transpose()
    }

    async fn find_account_for_user(
        &self,
        id: &str,
        user_id: i64,
    ) -> StorageResult<Option<SocialAccountRecord>> {
        let sql =
            format!("SELECT {ACCOUNT_COLUMNS} FROM social_accounts WHERE id = ?1 AND user_id = ?2");
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("Failed to get account: {}", e)))?;

        row.as_ref().map(Self::map_account_row).transpose()
    }

    async fn list_accounts_for_user(
        &self,
        user_id: i64,
    ) -> StorageResult<Vec<SocialAccountRecord>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM social_accounts WHERE user_id = ?1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("Failed to list accounts: {}", e)))?;

        rows.iter().map(Self::map_account_row).collect()
    }

    async fn update_account_tokens(
        &self,
        id: &str,
        update: &TokenUpdate,
    ) -> StorageResult<SocialAccountRecord> {
        let sql = format!(
            r#"
            UPDATE social_accounts SET
                access_token = ?1,
                refresh_token = COALESCE(?2, refresh_token),
                token_expires_at = ?3,
                status = 'ACTIVE',
                error_message = NULL,
                updated_at = ?4
            WHERE id = ?5
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(&update.access_token)
            .bind(&update.refresh_token)
            .bind(update.token_expires_at.map(|t| t.to_rfc3339()))
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("Failed to update tokens: {}", e)))?;

        match row {
            Some(row) => Self::map_account_row(&row),
            None => Err(StorageError::NotFound),
        }
    }

    async fn mark_account_expired(&self, id: &str, error_message: &str) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE social_accounts SET status = 'EXPIRED', error_message = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(error_message)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("Failed to mark account expired: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn delete_account(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM social_accounts WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("Failed to delete account: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
