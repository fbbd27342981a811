use super::{CacheStorage, StateData, StorageError, StorageResult};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, RedisError, aio::ConnectionManager};
use std::time::Duration;
use tokio::time::timeout;

/// Redis cache storage implementation
pub struct RedisCacheStorage {
    connection: ConnectionManager,
    key_prefix: String,
    command_timeout: Duration,
}

impl RedisCacheStorage {
    pub async fn new(
        redis_url: &str,
        key_prefix: &str,
        command_timeout_seconds: u64,
    ) -> StorageResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| StorageError::Connection(format!("Redis client error: {}", e)))?;

        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| StorageError::Connection(format!("Redis connection error: {}", e)))?;

        Ok(Self {
            connection,
            key_prefix: key_prefix.to_string(),
            command_timeout: Duration::from_secs(command_timeout_seconds),
        })
    }

    fn state_key(&self, key: &str) -> String {
        format!("{}state:{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CacheStorage for RedisCacheStorage {
    async fn store_state(
        &self,
        key: &str,
        state: &StateData,
        ttl_seconds: u64,
    ) -> StorageResult<()> {
        let serialized = serde_json::to_string(state)
            .map_err(|e| StorageError::Serialization(format!("Serialization error: {}", e)))?;

        let redis_key = self.state_key(key);
        let mut conn = self.connection.clone();

        timeout(self.command_timeout, async {
            let _: () = conn.set_ex(redis_key, serialized, ttl_seconds).await?;
            Ok::<(), RedisError>(())
        })
        .await
        .map_err(|_| StorageError::Redis("Command timeout".to_string()))?
        .map_err(|e: RedisError| StorageError::Redis(format!("Redis SET error: {}", e)))?;

        Ok(())
    }

    async fn take_state(&self, key: &str) -> StorageResult<Option<StateData>> {
        let redis_key = self.state_key(key);
        let mut conn = self.connection.clone();

        // GETDEL makes the consume atomic across instances: exactly one
        // caller ever sees the value.
        let result: Option<String> = timeout(self.command_timeout, async {
            redis::cmd("GETDEL")
                .arg(&redis_key)
                .query_async(&mut conn)
                .await
        })
        .await
        .map_err(|_| StorageError::Redis("Command timeout".to_string()))?
        .map_err(|e: RedisError| StorageError::Redis(format!("Redis GETDEL error: {}", e)))?;

        match result {
            Some(data) => {
                let state = serde_json::from_str(&data).map_err(|e| {
                    StorageError::Serialization(format!("Deserialization error: {}", e))
                })?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn health_check(&self) -> StorageResult<()> {
        let mut conn = self.connection.clone();

        timeout(self.command_timeout, async {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<(), RedisError>(())
        })
        .await
        .map_err(|_| StorageError::Redis("Command timeout".to_string()))?
        .map_err(|e: RedisError| StorageError::Redis(format!("Redis PING error: {}", e)))?;

        Ok(())
    }
}
