//! Registration, login and session endpoints.

mod common;

use axum::http::StatusCode;
use common::{TestHarness, body_json};

#[tokio::test]
async fn test_register_and_login() {
    let harness = TestHarness::new().await;

    let response = harness
        .post(
            "/api/auth/register",
            serde_json::json!({
                "email": "new@example.com",
                "password": "s3cretpass",
                "displayName": "New User"
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert!(body["token"].as_str().is_some());
    assert_eq!(body["user"]["email"], "new@example.com");
    assert_eq!(body["user"]["displayName"], "New User");
    assert!(body["user"].get("passwordHash").is_none());

    let response = harness
        .post(
            "/api/auth/login",
            serde_json::json!({
                "email": "new@example.com",
                "password": "s3cretpass"
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["token"].as_str().is_some());
}

#[tokio::test]
async fn test_register_validation() {
    let harness = TestHarness::new().await;

    let response = harness
        .post(
            "/api/auth/register",
            serde_json::json!({"email": "not-an-email", "password": "s3cretpass"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = harness
        .post(
            "/api/auth/register",
            serde_json::json!({"email": "ok@example.com", "password": "short"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let harness = TestHarness::new().await;

    // The harness already registered owner@example.com.
    let response = harness
        .post(
            "/api/auth/register",
            serde_json::json!({"email": "owner@example.com", "password": "s3cretpass"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let harness = TestHarness::new().await;

    let wrong_password = harness
        .post(
            "/api/auth/login",
            serde_json::json!({"email": "owner@example.com", "password": "wrong-password"}),
        )
        .await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    let wrong_password = body_json(wrong_password).await;

    let unknown_user = harness
        .post(
            "/api/auth/login",
            serde_json::json!({"email": "nobody@example.com", "password": "wrong-password"}),
        )
        .await;
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
    let unknown_user = body_json(unknown_user).await;

    assert_eq!(wrong_password["message"], unknown_user["message"]);
}

#[tokio::test]
async fn test_me_returns_current_user() {
    let harness = TestHarness::new().await;

    let response = harness.get("/api/auth/me").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["email"], "owner@example.com");
    assert_eq!(body["id"], harness.user_id);
}

#[tokio::test]
async fn test_me_requires_valid_token() {
    let harness = TestHarness::new().await;

    let response = harness.get_anonymous("/api/auth/me").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_endpoint() {
    let harness = TestHarness::new().await;

    let response = harness.get_anonymous("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["service"], "sociallink");
    assert_eq!(body["status"], "healthy");

    let response = harness.get_anonymous("/health?check=all").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["checks"].get("storage").is_some());
    assert!(body["checks"].get("jwt").is_some());
}
