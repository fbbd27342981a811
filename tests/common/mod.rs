//! Shared harness for integration tests: a server wired to a wiremock
//! platform, plus request helpers.

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use chrono::Utc;
use serde_json::Value;
use sociallink::server::Server;
use sociallink::storage::{AccountIdentity, AccountUpsert, Platform, SocialAccountRecord};
use sociallink::test_utils::{TestServerBuilder, create_test_jwt, create_test_user};
use tower::ServiceExt;
use wiremock::MockServer;

pub struct TestHarness {
    pub server: Server,
    pub mock: MockServer,
    pub user_id: i64,
    pub token: String,
}

impl TestHarness {
    pub async fn new() -> Self {
        let mock = MockServer::start().await;
        let server = TestServerBuilder::new()
            .with_platform_base_url(&mock.uri())
            .build()
            .await;

        let user = create_test_user(&server, "owner@example.com").await;
        let token = create_test_jwt(&server, user.id);

        Self {
            server,
            mock,
            user_id: user.id,
            token,
        }
    }

    pub fn app(&self) -> Router {
        self.server.create_app()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        let request = Request::builder()
            .uri(uri)
            .header("Authorization", format!("Bearer {}", self.token))
            .body(Body::empty())
            .unwrap();
        self.app().oneshot(request).await.unwrap()
    }

    pub async fn get_anonymous(&self, uri: &str) -> Response<Body> {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.app().oneshot(request).await.unwrap()
    }

    pub async fn post(&self, uri: &str, body: Value) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.app().oneshot(request).await.unwrap()
    }

    pub async fn delete(&self, uri: &str) -> Response<Body> {
        let request = Request::builder()
            .method("DELETE")
            .uri(uri)
            .header("Authorization", format!("Bearer {}", self.token))
            .body(Body::empty())
            .unwrap();
        self.app().oneshot(request).await.unwrap()
    }

    /// Seed a connected account directly through storage.
    pub async fn seed_account(
        &self,
        platform: Platform,
        platform_user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> SocialAccountRecord {
        let identity = AccountIdentity {
            user_id: self.user_id,
            platform,
            platform_user_id: platform_user_id.to_string(),
        };
        let fields = AccountUpsert {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            token_expires_at: Some(Utc::now() + chrono::Duration::days(30)),
            platform_username: Some("seeded".to_string()),
            platform_display_name: Some("Seeded Account".to_string()),
            profile_picture_url: None,
            metadata: serde_json::json!({}),
        };
        self.server
            .storage
            .database
            .upsert_account(&identity, &fields)
            .await
            .unwrap()
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location_header(response: &Response<Body>) -> String {
    response
        .headers()
        .get("location")
        .expect("missing Location header")
        .to_str()
        .unwrap()
        .to_string()
}

/// Pull the `state` query parameter out of a provider authorization URL.
pub fn extract_state(auth_url: &str) -> String {
    let url = url::Url::parse(auth_url).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("auth URL missing state")
}
