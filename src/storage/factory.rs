use super::{
    CacheStorage, DatabaseStorage, Storage, StorageError, StorageResult,
    memory::{MemoryCacheStorage, MemoryDatabaseStorage},
    redis::RedisCacheStorage,
    sqlite::SqliteStorage,
};
use crate::config::Config;

/// Storage backend types
#[derive(Debug, Clone)]
pub enum CacheBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub enum DatabaseBackend {
    Memory,
    Sqlite,
}

/// Storage factory for creating appropriate storage backends
pub struct StorageFactory;

impl StorageFactory {
    /// Create storage from application config
    pub async fn create_from_config(config: &Config) -> StorageResult<Storage> {
        let cache = Self::create_cache_storage(config).await?;
        let database = Self::create_database_storage(config).await?;

        let storage = Storage::new(cache, database);
        storage.migrate().await?;
        Ok(storage)
    }

    async fn create_cache_storage(config: &Config) -> StorageResult<Box<dyn CacheStorage>> {
        match Self::cache_backend(config)? {
            CacheBackend::Memory => Ok(Box::new(MemoryCacheStorage::new(
                config.storage.cache.cleanup_interval,
            ))),
            CacheBackend::Redis => {
                let redis = &config.storage.cache.redis;
                let cache =
                    RedisCacheStorage::new(&redis.url, &redis.key_prefix, redis.command_timeout)
                        .await?;
                Ok(Box::new(cache))
            }
        }
    }

    async fn create_database_storage(config: &Config) -> StorageResult<Box<dyn DatabaseStorage>> {
        match Self::database_backend(config)? {
            DatabaseBackend::Memory => Ok(Box::new(MemoryDatabaseStorage::new())),
            DatabaseBackend::Sqlite => {
                let database = SqliteStorage::new(&config.storage.database.url).await?;
                Ok(Box::new(database))
            }
        }
    }

    fn cache_backend(config: &Config) -> StorageResult<CacheBackend> {
        match config.storage.cache.backend.as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "redis" => Ok(CacheBackend::Redis),
            other => Err(StorageError::Connection(format!(
                "Unsupported cache backend: {}",
                other
            ))),
        }
    }

    fn database_backend(config: &Config) -> StorageResult<DatabaseBackend> {
        match config.storage.database.backend.as_str() {
            "memory" => Ok(DatabaseBackend::Memory),
            "sqlite" => Ok(DatabaseBackend::Sqlite),
            other => Err(StorageError::Connection(format!(
                "Unsupported database backend: {}",
                other
            ))),
        }
    }

    /// Create storage for testing with memory backends
    pub async fn create_test_storage() -> StorageResult<Storage> {
        let cache = MemoryCacheStorage::new(60);
        let database = MemoryDatabaseStorage::new();
        let storage = Storage::new(Box::new(cache), Box::new(database));
        storage.migrate().await?;
        Ok(storage)
    }
}
