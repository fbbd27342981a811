use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::{Connector, ConnectorError, StateStore, decode_platform_error};
use crate::config::LinkedInConfig;
use crate::storage::{
    AccountIdentity, AccountUpsert, Platform, SocialAccountRecord, Storage, TokenUpdate,
};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    picture: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
}

/// LinkedIn connector. A single form-encoded exchange returns the access
/// token (and, for programs enrolled in refresh tokens, a refresh token);
/// identity comes from the OpenID Connect userinfo endpoint.
pub struct LinkedInConnector {
    config: LinkedInConfig,
    http: reqwest::Client,
    storage: Arc<Storage>,
    states: StateStore,
}

impl LinkedInConnector {
    pub fn new(
        config: LinkedInConfig,
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

    async fn exchange_code_for_token(&self, code: &str) -> Result<TokenResponse, ConnectorError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let err = decode_platform_error(response).await;
            return Err(ConnectorError::TokenExchange(err.to_string()));
        }

        Ok(response.json().await?)
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenResponse, ConnectorError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let err = decode_platform_error(response).await;
            return Err(ConnectorError::TokenExchange(err.to_string()));
        }

        Ok(response.json().await?)
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<UserInfo, ConnectorError> {
        let response = self
            .http
            .get(format!("{}/userinfo", self.config.api_url))
            .bearer_auth(access_token)
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
impl Connector for LinkedInConnector {
    fn platform(&self) -> Platform {
        Platform::Linkedin
    }

    async fn get_auth_url(&self, user_id: i64) -> Result<String, ConnectorError> {
        let state = self.states.issue(user_id).await?;

        let mut url = Url::parse(&self.config.authorization_url)
            .map_err(|e| ConnectorError::Configuration(format!("Bad authorization URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("state", &state)
            .append_pair("scope", &self.config.scopes);

        Ok(url.into())
    }

    async fn handle_callback(
        &self,
        code: &str,
        state: &str,
    ) -> Result<SocialAccountRecord, ConnectorError> {
        let user_id = self.states.consume(state).await?;

        let tokens = self.exchange_code_for_token(code).await?;
        let userinfo = self.fetch_userinfo(&tokens.access_token).await?;

        let identity = AccountIdentity {
            user_id,
            platform: Platform::Linkedin,
            platform_user_id: userinfo.sub.clone(),
        };
        let fields = AccountUpsert {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_expires_at: Some(Utc::now() + chrono::Duration::seconds(tokens.expires_in)),
            platform_username: userinfo.email.clone(),
            platform_display_name: userinfo.name,
            profile_picture_url: userinfo.picture,
            metadata: serde_json::json!({
                "email": userinfo.email,
                "emailVerified": userinfo.email_verified,
            }),
        };

        let account = self.storage.database.upsert_account(&identity, &fields).await?;
        debug!(account_id = %account.id, user_id, "Connected LinkedIn account");
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

        let refresh_token = account
            .refresh_token
            .as_deref()
            .ok_or(ConnectorError::NoRefreshToken)?;

        match self.refresh_grant(refresh_token).await {
            Ok(tokens) => {
                // A missing refresh_token in the response keeps the stored one.
                let update = TokenUpdate {
                    access_token: tokens.access_token,
                    refresh_token: tokens.refresh_token,
                    token_expires_at: Some(
                        Utc::now() + chrono::Duration::seconds(tokens.expires_in),
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
