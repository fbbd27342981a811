use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::{Connector, ConnectorError, StateStore, decode_platform_error};
use crate::config::InstagramConfig;
use crate::storage::{AccountIdentity, AccountUpsert, Platform, SocialAccountRecord, Storage};

/// Facebook issues long-lived user tokens for about 60 days; page tokens
/// derived from them inherit the same horizon.
pub const INSTAGRAM_TOKEN_TTL_DAYS: i64 = 60;

#[derive(Debug, Deserialize)]
struct ShortLivedTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct LongLivedTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PagesResponse {
    #[serde(default)]
    data: Vec<PageEntry>,
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    id: String,
    name: String,
    access_token: String,
    instagram_business_account: Option<BusinessAccountRef>,
}

#[derive(Debug, Deserialize)]
struct BusinessAccountRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct InstagramProfile {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    profile_picture_url: Option<String>,
}

/// Instagram connector. Connects through the Facebook Graph API: the OAuth
/// code buys a short-lived user token, which is upgraded to a long-lived one
/// and then traded for a page access token carrying the linked Instagram
/// business account.
pub struct InstagramConnector {
    config: InstagramConfig,
    http: reqwest::Client,
    storage: Arc<Storage>,
    states: StateStore,
}

impl InstagramConnector {
    pub fn new(
        config: InstagramConfig,
        http: reqwest::Client,
        storage: Arc<Storage>,
        states: StateStore,
    ) -> Self {
        Self {
            config,
            http,
            storage,
            states,
        }
    }

    async fn exchange_code_for_token(&self, code: &str) -> Result<String, ConnectorError> {
        let response = self
            .http
            .get(format!("{}/oauth/access_token", self.config.graph_api_url))
            .query(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code", code),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let err = decode_platform_error(response).await;
            return Err(ConnectorError::TokenExchange(err.to_string()));
        }

        let body: ShortLivedTokenResponse = response.json().await?;
        Ok(body.access_token)
    }

    /// Upgrade a user token to a ~60-day one. Also the refresh path: Facebook
    /// has no refresh grant, re-running the exchange extends the horizon.
    async fn exchange_for_long_lived(&self, token: &str) -> Result<String, ConnectorError> {
        let response = self
            .http
            .get(format!("{}/oauth/access_token", self.config.graph_api_url))
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("fb_exchange_token", token),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let err = decode_platform_error(response).await;
            return Err(ConnectorError::TokenExchange(err.to_string()));
        }

        let body: LongLivedTokenResponse = response.json().await?;
        Ok(body.access_token)
    }

    async fn fetch_pages(&self, token: &str) -> Result<Vec<PageEntry>, ConnectorError> {
        let response = self
            .http
            .get(format!("{}/me/accounts", self.config.graph_api_url))
            .query(&[
                (
                    "fields",
                    "id,name,access_token,instagram_business_account",
                ),
                ("access_token", token),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let err = decode_platform_error(response).await;
            return Err(ConnectorError::IdentityResolution(err.to_string()));
        }

        let body: PagesResponse = response.json().await?;
        Ok(body.data)
    }

    async fn fetch_profile(
        &self,
        instagram_user_id: &str,
        token: &str,
    ) -> Result<InstagramProfile, ConnectorError> {
        let response = self
            .http
            .get(format!(
                "{}/{}",
                self.config.graph_api_url, instagram_user_id
            ))
            .query(&[
                ("fields", "username,name,profile_picture_url"),
                ("access_token", token),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let err = decode_platform_error(response).await;
            return Err(ConnectorError::IdentityResolution(err.to_string()));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Connector for InstagramConnector {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn get_auth_url(&self, user_id: i64) -> Result<String, ConnectorError> {
        let state = self.states.issue(user_id).await?;

        let mut url = Url::parse(&format!("{}/dialog/oauth", self.config.oauth_base_url))
            .map_err(|e| ConnectorError::Configuration(format!("Bad OAuth base URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes)
            .append_pair("response_type", "code")
            .append_pair("state", &state);

        Ok(url.into())
    }

    async fn handle_callback(
        &self,
        code: &str,
        state: &str,
    ) -> Result<SocialAccountRecord, ConnectorError> {
        let user_id = self.states.consume(state).await?;

        let short_lived = self.exchange_code_for_token(code).await?;
        let long_lived = self.exchange_for_long_lived(&short_lived).await?;

        let pages = self.fetch_pages(&long_lived).await?;
        let page = pages
            .into_iter()
            .find(|p| p.instagram_business_account.is_some())
            .ok_or_else(|| {
                ConnectorError::IdentityResolution(
                    "No Instagram business account found. Make sure your Instagram account \
                     is connected to a Facebook page."
                        .to_string(),
                )
            })?;
        debug!(page_id = %page.id, page_name = %page.name, "Selected Facebook page");

        let business_account = page
            .instagram_business_account
            .as_ref()
            .map(|b| b.id.clone())
            .unwrap_or_default();

        let profile = self
            .fetch_profile(&business_account, &page.access_token)
            .await?;

        let identity = AccountIdentity {
            user_id,
            platform: Platform::Instagram,
            platform_user_id: business_account,
        };
        // The page token is what the insights API accepts, so that is the
        // credential we keep.
        let fields = AccountUpsert {
            access_token: page.access_token.clone(),
            refresh_token: None,
            token_expires_at: Some(
                Utc::now() + chrono::Duration::days(INSTAGRAM_TOKEN_TTL_DAYS),
            ),
            platform_username: profile.username,
            platform_display_name: profile.name,
            profile_picture_url: profile.profile_picture_url,
            metadata: serde_json::json!({
                "pageId": page.id,
                "pageName": page.name,
            }),
        };

        let account = self.storage.database.upsert_account(&identity, &fields).await?;
        debug!(account_id = %account.id, user_id, "Connected Instagram account");
        Ok(account)
    }

    async fn refresh_token(
        &self,
        account_id: &str,
    ) -> Result<SocialAccountRecord, ConnectorError> {
        let account = self
            .storage
            .database
            .find_account(account_id)
            .await?
            .ok_or(ConnectorError::AccountNotFound)?;

        match self.exchange_for_long_lived(&account.access_token).await {
            Ok(new_token) => {
                let update = crate::storage::TokenUpdate {
                    access_token: new_token,
                    refresh_token: None,
                    token_expires_at: Some(
                        Utc::now() + chrono::Duration::days(INSTAGRAM_TOKEN_TTL_DAYS),
                    ),
                };
                Ok(self
                    .storage
                    .database
                    .update_account_tokens(account_id, &update)
                    .await?)
            }
            Err(err) => {
                if let Err(mark_err) = self
                    .storage
                    .database
                    .mark_account_expired(account_id, &err.to_string())
                    .await
                {
                    warn!(account_id, error = %mark_err, "Failed to mark account expired");
                }
                Err(err)
            }
        }
    }
}
