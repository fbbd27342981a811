use super::{StorageError, StorageResult};
use sqlx::{Pool, Sqlite};

/// Ordered schema migrations. Applied migrations are recorded in
/// `schema_migrations` so reruns are no-ops.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_create_users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            display_name TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    ),
    (
        "002_create_social_accounts",
        r#"
        CREATE TABLE IF NOT EXISTS social_accounts (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            platform TEXT NOT NULL,
            platform_user_id TEXT NOT NULL,
            platform_username TEXT,
            platform_display_name TEXT,
            profile_picture_url TEXT,
            access_token TEXT NOT NULL,
            refresh_token TEXT,
            token_expires_at TEXT,
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            error_message TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_social_accounts_identity
            ON social_accounts (user_id, platform, platform_user_id);
        CREATE INDEX IF NOT EXISTS idx_social_accounts_user
            ON social_accounts (user_id);
        "#,
    ),
];

/// Parse SQL script into individual statements
fn parse_sql_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("{};", s))
        .collect()
}

pub async fn run_sqlite_migrations(pool: &Pool<Sqlite>) -> StorageResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (name TEXT PRIMARY KEY, applied_at TEXT NOT NULL)",
    )
    .execute(pool)
    .await
    .map_err(|e| StorageError::Database(format!("Failed to create migrations table: {}", e)))?;

    for (name, sql) in MIGRATIONS {
        let applied: Option<(String,)> =
            sqlx::query_as("SELECT name FROM schema_migrations WHERE name = ?1")
                .bind(name)
                .fetch_optional(pool)
                .await
                .map_err(|e| {
                    StorageError::Database(format!("Failed to check migration state: {}", e))
                })?;

        if applied.is_some() {
            continue;
        }

        for statement in parse_sql_statements(sql) {
            sqlx::query(&statement).execute(pool).await.map_err(|e| {
                StorageError::Database(format!("Migration '{}' failed: {}", name, e))
            })?;
        }

        sqlx::query("INSERT INTO schema_migrations (name, applied_at) VALUES (?1, ?2)")
            .bind(name)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(pool)
            .await
            .map_err(|e| {
                StorageError::Database(format!("Failed to record migration '{}': {}", name, e))
            })?;

        tracing::debug!("Applied migration {}", name);
    }

    Ok(())
}
