use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthClaims, CurrentUser, hash_password, verify_password};
use crate::error::AppError;
use crate::server::Server;
use crate::storage::UserRecord;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: UserResponse,
}

/// Public authentication routes
pub fn create_auth_routes() -> Router<Server> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Routes that require a valid session token
pub fn create_protected_auth_routes() -> Router<Server> {
    Router::new().route("/me", get(me))
}

async fn register(
    State(server): State<Server>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    if !payload.email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }
    if payload.password.len() < 8 {
        return Err(AppError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let password_hash = hash_password(&payload.password)?;
    let user = server
        .storage
        .database
        .create_user(
            &payload.email,
            &password_hash,
            payload.display_name.as_deref(),
        )
        .await?;

    let token = issue_token(&server, user.id)?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            user: user.into(),
        }),
    ))
}

async fn login(
    State(server): State<Server>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    // Identical error for unknown email and bad password.
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let user = server
        .storage
        .database
        .find_user_by_email(&payload.email)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(invalid());
    }

    let token = issue_token(&server, user.id)?;
    Ok(Json(SessionResponse {
        token,
        user: user.into(),
    }))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}

fn issue_token(server: &Server, user_id: i64) -> Result<String, AppError> {
    let claims = AuthClaims::new(user_id, server.config.jwt.access_token_ttl);
    server.jwt_service.create_token(&claims)
}
