use axum::{
    Router,
    extract::{Path, Query, State},
    response::Redirect,
    routing::get,
};
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::error::AppError;
use crate::server::Server;
use crate::storage::Platform;

/// Frontend page the provider redirect lands on.
const FRONTEND_SETTINGS_PATH: &str = "/settings/social-accounts";

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

pub fn create_callback_routes() -> Router<Server> {
    Router::new().route("/{platform}/callback", get(oauth_callback))
}

/// Provider redirect target. Always answers with a redirect back to the
/// frontend settings page; outcomes travel as query parameters.
async fn oauth_callback(
    State(server): State<Server>,
    Path(platform): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, AppError> {
    let frontend = &server.config.frontend.url;

    let platform = match platform.parse::<Platform>() {
        Ok(platform) => platform,
        Err(_) => {
            return redirect_with(frontend, &[("error", "unsupported_platform")]);
        }
    };

    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or(error);
        warn!(%platform, "OAuth provider returned an error");
        return redirect_with(frontend, &[("error", description.as_str())]);
    }

    let (code, state) = match (query.code, query.state) {
        (Some(code), Some(state)) => (code, state),
        _ => return redirect_with(frontend, &[("error", "missing_parameters")]),
    };

    let connector = server.connectors.get(platform)?;
    match connector.handle_callback(&code, &state).await {
        Ok(_) => {
            let success = format!("{}_connected", platform.as_str().to_lowercase());
            redirect_with(frontend, &[("success", success.as_str())])
        }
        Err(err) => {
            warn!(%platform, error = %err, "OAuth callback failed");
            redirect_with(frontend, &[("error", err.to_string().as_str())])
        }
    }
}

fn redirect_with(frontend_url: &str, params: &[(&str, &str)]) -> Result<Redirect, AppError> {
    let mut url = Url::parse(frontend_url)
        .map_err(|e| AppError::Internal(format!("Bad frontend URL: {}", e)))?;
    url.set_path(FRONTEND_SETTINGS_PATH);
    url.query_pairs_mut().extend_pairs(params);
    Ok(Redirect::temporary(url.as_str()))
}
