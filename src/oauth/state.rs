use chrono::Utc;
use rand::RngCore;
use std::sync::Arc;

use super::ConnectorError;
use crate::storage::{StateData, Storage};

/// CSRF state lifetime. Ten minutes covers the provider round trip with
/// room for slow logins.
pub const STATE_TTL_SECONDS: u64 = 600;

/// Issues and consumes single-use CSRF state tokens backing the OAuth
/// authorization flow.
#[derive(Clone)]
pub struct StateStore {
    storage: Arc<Storage>,
}

impl StateStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Mint an unguessable state token bound to the initiating user.
    pub async fn issue(&self, user_id: i64) -> Result<String, ConnectorError> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let now = Utc::now();
        let data = StateData {
            user_id,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(STATE_TTL_SECONDS as i64),
        };

        self.storage
            .cache
            .store_state(&token, &data, STATE_TTL_SECONDS)
            .await?;

        Ok(token)
    }

    /// Consume a state token, returning the user it was issued for. The
    /// token is removed before any validation, so a replay always fails.
    pub async fn consume(&self, state: &str) -> Result<i64, ConnectorError> {
        let data = self
            .storage
            .cache
            .take_state(state)
            .await?
            .ok_or(ConnectorError::InvalidState)?;

        if data.expires_at < Utc::now() {
            return Err(ConnectorError::StateExpired);
        }

        Ok(data.user_id)
    }
}
