//! Shared helpers for integration tests. Builds servers on in-memory
//! backends with platform endpoints pointed at a mock server.

use crate::auth::{AuthClaims, hash_password};
use crate::config::Config;
use crate::server::Server;
use crate::storage::UserRecord;

pub struct TestServerBuilder {
    config: Config,
}

impl TestServerBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.jwt.secret = "test-secret".to_string();
        config.storage.cache.backend = "memory".to_string();
        config.storage.database.backend = "memory".to_string();

        config.platforms.instagram.client_id = "ig-client-id".to_string();
        config.platforms.instagram.client_secret = "ig-client-secret".to_string();
        config.platforms.instagram.redirect_uri =
            "http://localhost:3000/api/oauth/instagram/callback".to_string();

        config.platforms.linkedin.client_id = "li-client-id".to_string();
        config.platforms.linkedin.client_secret = "li-client-secret".to_string();
        config.platforms.linkedin.redirect_uri =
            "http://localhost:3000/api/oauth/linkedin/callback".to_string();

        Self { config }
    }

    /// Point every platform endpoint at a mock server base URL.
    pub fn with_platform_base_url(mut self, base: &str) -> Self {
        self.config.platforms.instagram.oauth_base_url = format!("{}/fb", base);
        self.config.platforms.instagram.graph_api_url = format!("{}/graph", base);
        self.config.platforms.linkedin.authorization_url =
            format!("{}/linkedin/authorization", base);
        self.config.platforms.linkedin.token_url = format!("{}/linkedin/accessToken", base);
        self.config.platforms.linkedin.api_url = format!("{}/linkedin", base);
        self
    }

    pub fn with_config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub async fn build(self) -> Server {
        Server::new(self.config)
            .await
            .expect("failed to build test server")
    }
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Register a user directly through storage, skipping the HTTP surface.
pub async fn create_test_user(server: &Server, email: &str) -> UserRecord {
    let password_hash = hash_password("password123").expect("hashing failed");
    server
        .storage
        .database
        .create_user(email, &password_hash, Some("Test User"))
        .await
        .expect("failed to create test user")
}

/// Mint a valid session token for the given user.
pub fn create_test_jwt(server: &Server, user_id: i64) -> String {
    server
        .jwt_service
        .create_token(&AuthClaims::new(user_id, 3600))
        .expect("failed to create test token")
}
