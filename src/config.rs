use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
    pub frontend: FrontendConfig,
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: String,
    /// Access token lifetime in seconds.
    pub access_token_ttl: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "change-me".to_string(),
            algorithm: "HS256".to_string(),
            access_token_ttl: 86_400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    pub cache: CacheConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// "memory" or "redis"
    pub backend: String,
    /// Expired-entry sweep interval for the memory backend, in seconds.
    pub cleanup_interval: u64,
    pub redis: RedisConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            cleanup_interval: 300,
            redis: RedisConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub key_prefix: String,
    pub command_timeout: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "sociallink:".to_string(),
            command_timeout: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// "memory" or "sqlite"
    pub backend: String,
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            url: "sqlite://sociallink.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Outbound platform API timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_seconds: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// Base URL of the web frontend, used for OAuth callback redirects.
    pub url: String,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5173".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlatformsConfig {
    pub instagram: InstagramConfig,
    pub linkedin: LinkedInConfig,
}

/// Instagram connects through the Facebook Graph API; the client credentials
/// belong to a Facebook app. Endpoint URLs are overridable so tests can point
/// connectors at a mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: String,
    pub oauth_base_url: String,
    pub graph_api_url: String,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            scopes: "instagram_basic,instagram_content_publish,pages_show_list,pages_read_engagement"
                .to_string(),
            oauth_base_url: "https://www.facebook.com/v18.0".to_string(),
            graph_api_url: "https://graph.facebook.com/v18.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedInConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: String,
    pub authorization_url: String,
    pub token_url: String,
    pub api_url: String,
}

impl Default for LinkedInConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            scopes: "openid profile email".to_string(),
            authorization_url: "https://www.linkedin.com/oauth/v2/authorization".to_string(),
            token_url: "https://www.linkedin.com/oauth/v2/accessToken".to_string(),
            api_url: "https://api.linkedin.com/v2".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if Path::new("config.yaml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        builder = builder.add_source(
            Environment::with_prefix("SOCIALLINK")
                .prefix_separator("_")
                .separator("__"),
        );

        builder.build()?.try_deserialize()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if path.as_ref().exists() {
            builder = builder.add_source(File::from(path.as_ref()));
        }

        builder = builder.add_source(
            Environment::with_prefix("SOCIALLINK")
                .prefix_separator("_")
                .separator("__"),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.storage.cache.backend, "memory");
        assert_eq!(config.storage.database.backend, "memory");
        assert_eq!(config.http.timeout_seconds, 10);
        assert!(config
            .platforms
            .instagram
            .graph_api_url
            .starts_with("https://graph.facebook.com"));
    }

    #[test]
    fn test_config_load_from_yaml_file() {
        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 4000
jwt:
  secret: "file-secret"
platforms:
  instagram:
    client_id: "fb-app-id"
    client_secret: "fb-app-secret"
    redirect_uri: "https://example.com/api/oauth/instagram/callback"
  linkedin:
    client_id: "li-client"
    client_secret: "li-secret"
    redirect_uri: "https://example.com/api/oauth/linkedin/callback"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = Config::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.jwt.secret, "file-secret");
        assert_eq!(config.platforms.instagram.client_id, "fb-app-id");
        assert_eq!(config.platforms.linkedin.client_id, "li-client");
        // Unset fields keep their defaults.
        assert_eq!(config.platforms.linkedin.scopes, "openid profile email");
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let config = Config::load_from_file("nonexistent.yaml").unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
    }
}
