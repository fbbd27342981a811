use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::{InsightMetric, InsightsParams};
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::server::Server;
use crate::storage::{AccountStatus, Platform, SocialAccountRecord};

/// Client-facing account view. Access and refresh tokens are deliberately
/// absent; they never leave the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: String,
    pub platform: Platform,
    pub platform_user_id: String,
    pub platform_username: Option<String>,
    pub platform_display_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub status: AccountStatus,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SocialAccountRecord> for AccountSummary {
    fn from(account: SocialAccountRecord) -> Self {
        Self {
            id: account.id,
            platform: account.platform,
            platform_user_id: account.platform_user_id,
            platform_username: account.platform_username,
            platform_display_name: account.platform_display_name,
            profile_picture_url: account.profile_picture_url,
            status: account.status,
            token_expires_at: account.token_expires_at,
            error_message: account.error_message,
            metadata: account.metadata,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlResponse {
    pub auth_url: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    #[serde(default)]
    pub metrics: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub until: Option<String>,
}

pub fn create_account_routes() -> Router<Server> {
    Router::new()
        .route("/", get(list_accounts))
        .route("/instagram/auth-url", get(instagram_auth_url))
        .route("/linkedin/auth-url", get(linkedin_auth_url))
        .route("/{id}", delete(disconnect_account))
        .route("/{id}/refresh", post(refresh_account))
        .route("/{id}/analytics", get(account_analytics))
}

async fn list_accounts(
    State(server): State<Server>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<AccountSummary>>, AppError> {
    let accounts = server
        .storage
        .database
        .list_accounts_for_user(user.id)
        .await?;
    Ok(Json(accounts.into_iter().map(Into::into).collect()))
}

async fn instagram_auth_url(
    State(server): State<Server>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<AuthUrlResponse>, AppError> {
    auth_url_for(&server, Platform::Instagram, user.id).await
}

async fn linkedin_auth_url(
    State(server): State<Server>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<AuthUrlResponse>, AppError> {
    auth_url_for(&server, Platform::Linkedin, user.id).await
}

async fn auth_url_for(
    server: &Server,
    platform: Platform,
    user_id: i64,
) -> Result<Json<AuthUrlResponse>, AppError> {
    let connector = server.connectors.get(platform)?;
    let auth_url = connector.get_auth_url(user_id).await?;
    Ok(Json(AuthUrlResponse { auth_url }))
}

async fn disconnect_account(
    State(server): State<Server>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    server
        .storage
        .database
        .find_account_for_user(&id, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;

    server.storage.database.delete_account(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn refresh_account(
    State(server): State<Server>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<AccountSummary>, AppError> {
    let account = server
        .storage
        .database
        .find_account_for_user(&id, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;

    let connector = server.connectors.get(account.platform)?;
    let refreshed = connector.refresh_token(&id).await?;
    Ok(Json(refreshed.into()))
}

async fn account_analytics(
    State(server): State<Server>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsResponse>, AppError> {
    let mut params = InsightsParams::default();
    if let Some(metrics) = query.metrics {
        let requested: Vec<String> = metrics
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        if !requested.is_empty() {
            params.metrics = requested;
        }
    }
    if let Some(period) = query.period {
        params.period = period;
    }
    params.since = query.since;
    params.until = query.until;

    let data = server.analytics.get_insights(&id, user.id, &params).await?;
    Ok(Json(AnalyticsResponse { data }))
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub data: Vec<InsightMetric>,
}
