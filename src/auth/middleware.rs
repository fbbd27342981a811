use crate::error::AppError;
use crate::server::Server;
use crate::storage::UserRecord;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::trace;

/// Bearer-JWT authentication middleware. Validates the token, loads the
/// user record and inserts it into request extensions for downstream
/// handlers.
pub async fn jwt_auth_middleware(
    State(server): State<Server>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Missing authentication credentials".to_string()))?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header".to_string()))?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization format".to_string()))?;

    trace!("Authenticating request with bearer token");
    let claims = server.jwt_service.validate_token(token)?;

    let user = server
        .storage
        .database
        .find_user_by_id(claims.sub)
        .await
        .map_err(|e| AppError::Internal(format!("User lookup failed: {}", e)))?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Extractor for the authenticated user placed in extensions by
/// `jwt_auth_middleware`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRecord);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserRecord>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Missing authentication".to_string()))
    }
}
