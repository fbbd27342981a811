//! Analytics fetch flows, including the transparent token refresh retry.

mod common;

use axum::http::StatusCode;
use common::{TestHarness, body_json};
use sociallink::storage::Platform;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

const IG_ID: &str = "17841400000000001";

fn reach_body() -> serde_json::Value {
    serde_json::json!({
        "data": [{
            "name": "reach",
            "period": "day",
            "values": [
                {"value": 120, "end_time": "2026-08-21T07:00:00+0000"},
                {"value": 95, "end_time": "2026-08-22T07:00:00+0000"}
            ]
        }]
    })
}

fn auth_error_body() -> serde_json::Value {
    serde_json::json!({
        "error": {
            "message": "Error validating access token: Session has expired",
            "type": "OAuthException",
            "code": 190
        }
    })
}

#[tokio::test]
async fn test_insights_happy_path() {
    let harness = TestHarness::new().await;
    let account = harness
        .seed_account(Platform::Instagram, IG_ID, "good-token", None)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/graph/{}/insights", IG_ID)))
        .and(query_param("metric", "reach"))
        .and(query_param("period", "day"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reach_body()))
        .expect(1)
        .mount(&harness.mock)
        .await;

    let response = harness
        .get(&format!(
            "/api/social-accounts/{}/analytics?metrics=reach",
            account.id
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["name"], "reach");
    assert_eq!(data[0]["values"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_expired_token_refreshed_and_retried_once() {
    let harness = TestHarness::new().await;
    let account = harness
        .seed_account(Platform::Instagram, IG_ID, "stale-token", None)
        .await;

    // First attempt with the stored token is rejected as expired.
    Mock::given(method("GET"))
        .and(path(format!("/graph/{}/insights", IG_ID)))
        .and(query_param("access_token", "stale-token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(auth_error_body()))
        .expect(1)
        .mount(&harness.mock)
        .await;

    Mock::given(method("GET"))
        .and(path("/graph/oauth/access_token"))
        .and(query_param("grant_type", "fb_exchange_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh-token",
            "token_type": "bearer",
            "expires_in": 5_184_000,
        })))
        .expect(1)
        .mount(&harness.mock)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/graph/{}/insights", IG_ID)))
        .and(query_param("access_token", "fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reach_body()))
        .expect(1)
        .mount(&harness.mock)
        .await;

    let response = harness
        .get(&format!(
            "/api/social-accounts/{}/analytics?metrics=reach",
            account.id
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"][0]["name"], "reach");

    let stored = harness
        .server
        .storage
        .database
        .find_account(&account.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.access_token, "fresh-token");
}

#[tokio::test]
async fn test_persistent_auth_error_fails_after_one_retry() {
    let harness = TestHarness::new().await;
    let account = harness
        .seed_account(Platform::Instagram, IG_ID, "stale-token", None)
        .await;

    // Both the initial attempt and the post-refresh retry are rejected.
    Mock::given(method("GET"))
        .and(path(format!("/graph/{}/insights", IG_ID)))
        .respond_with(ResponseTemplate::new(400).set_body_json(auth_error_body()))
        .expect(2)
        .mount(&harness.mock)
        .await;

    Mock::given(method("GET"))
        .and(path("/graph/oauth/access_token"))
        .and(query_param("grant_type", "fb_exchange_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh-token",
        })))
        .expect(1)
        .mount(&harness.mock)
        .await;

    let response = harness
        .get(&format!(
            "/api/social-accounts/{}/analytics?metrics=reach",
            account.id
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_placeholder_account_rejected_without_platform_calls() {
    let harness = TestHarness::new().await;
    let account = harness
        .seed_account(Platform::Instagram, "manual-123", "token", None)
        .await;

    let response = harness
        .get(&format!(
            "/api/social-accounts/{}/analytics?metrics=reach",
            account.id
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("Reconnect it via OAuth")
    );
    assert!(harness.mock.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_follower_count_failure_is_non_fatal() {
    let harness = TestHarness::new().await;
    let account = harness
        .seed_account(Platform::Instagram, IG_ID, "good-token", None)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/graph/{}/insights", IG_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(reach_body()))
        .mount(&harness.mock)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/graph/{}", IG_ID)))
        .and(query_param("fields", "followers_count"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "error": {"message": "Unknown error", "code": 1}
        })))
        .mount(&harness.mock)
        .await;

    let response = harness
        .get(&format!(
            "/api/social-accounts/{}/analytics?metrics=reach,follower_count",
            account.id
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["reach"]);
}

#[tokio::test]
async fn test_follower_count_auth_error_is_non_fatal() {
    let harness = TestHarness::new().await;
    let account = harness
        .seed_account(Platform::Instagram, IG_ID, "good-token", None)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/graph/{}/insights", IG_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(reach_body()))
        .mount(&harness.mock)
        .await;

    // Token rejection on the follower profile call alone never triggers a
    // refresh and never sinks the rest of the response.
    Mock::given(method("GET"))
        .and(path(format!("/graph/{}", IG_ID)))
        .and(query_param("fields", "followers_count"))
        .respond_with(ResponseTemplate::new(400).set_body_json(auth_error_body()))
        .mount(&harness.mock)
        .await;

    Mock::given(method("GET"))
        .and(path("/graph/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh-token",
        })))
        .expect(0)
        .mount(&harness.mock)
        .await;

    let response = harness
        .get(&format!(
            "/api/social-accounts/{}/analytics?metrics=reach,follower_count",
            account.id
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["reach"]);
}

#[tokio::test]
async fn test_follower_count_included_when_available() {
    let harness = TestHarness::new().await;
    let account = harness
        .seed_account(Platform::Instagram, IG_ID, "good-token", None)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/graph/{}", IG_ID)))
        .and(query_param("fields", "followers_count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "followers_count": 4210
        })))
        .mount(&harness.mock)
        .await;

    let response = harness
        .get(&format!(
            "/api/social-accounts/{}/analytics?metrics=follower_count",
            account.id
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["name"], "follower_count");
    assert_eq!(data[0]["values"][0]["value"], 4210);
}

#[tokio::test]
async fn test_total_value_metric_uses_dedicated_call() {
    let harness = TestHarness::new().await;
    let account = harness
        .seed_account(Platform::Instagram, IG_ID, "good-token", None)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/graph/{}/insights", IG_ID)))
        .and(query_param("metric", "profile_views"))
        .and(query_param("metric_type", "total_value"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{
                "name": "profile_views",
                "period": "day",
                "values": [],
                "total_value": {"value": 57}
            }]
        })))
        .expect(1)
        .mount(&harness.mock)
        .await;

    let response = harness
        .get(&format!(
            "/api/social-accounts/{}/analytics?metrics=profile_views",
            account.id
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"][0]["name"], "profile_views");
    assert_eq!(body["data"][0]["values"][0]["value"], 57);
}

#[tokio::test]
async fn test_analytics_unsupported_for_linkedin() {
    let harness = TestHarness::new().await;
    let account = harness
        .seed_account(Platform::Linkedin, "li-sub-123", "token", None)
        .await;

    let response = harness
        .get(&format!(
            "/api/social-accounts/{}/analytics?metrics=reach",
            account.id
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analytics_scoped_to_owner() {
    let harness = TestHarness::new().await;
    harness
        .seed_account(Platform::Instagram, IG_ID, "token", None)
        .await;

    let response = harness
        .get("/api/social-accounts/nonexistent-id/analytics?metrics=reach")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
