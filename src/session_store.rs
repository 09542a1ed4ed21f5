// Session persistence: bearer token, user snapshot and a synthesized expiry

use crate::clock::Clock;
use crate::error::StorageError;
use crate::storage::KeyValueStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

pub const TOKEN_KEY: &str = "auth_token";
pub const USER_KEY: &str = "user_data";
pub const SESSION_META_KEY: &str = "session_meta";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    // Profile fields this client does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub token: String,
    pub user: UserSnapshot,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionMeta {
    issued_at: DateTime<Utc>,
}

// Reads and writes the persisted session.
//
// The backend never tells us when a token expires, so expiry is synthesized
// as `issued_at + ttl` where `issued_at` is recorded by `save_token`. When
// no issue time was recorded the expiry is `now + ttl` at read time. This is
// a heuristic for the splash flow, not a security boundary. An expiry that
// does not fit a timestamp is read as no session.
//
// Apart from `try_get_session`, storage failures never escape: they are
// logged and reported as a miss (`None`) or as `false`.
pub struct SessionStore {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl SessionStore {
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            storage,
            clock,
            ttl,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn save_token(&self, token: &str) -> bool {
        let result = self.write_token(token).await;
        report("save_token", result).is_some()
    }

    pub async fn save_user(&self, user: &UserSnapshot) -> bool {
        let result = self.write_user(user).await;
        report("save_user", result).is_some()
    }

    // Writes both halves of the session; on a partial failure everything is
    // removed again so a token never outlives its user or vice versa.
    pub async fn save_session(&self, token: &str, user: &UserSnapshot) -> bool {
        let result = async {
            self.write_user(user).await?;
            self.write_token(token).await
        }
        .await;

        if report("save_session", result).is_some() {
            tracing::info!(user_id = %user.id, "session saved");
            true
        } else {
            self.clear_session().await;
            false
        }
    }

    pub async fn get_token(&self) -> Option<String> {
        let result = self.storage.get_item(TOKEN_KEY).await;
        report("get_token", result).flatten()
    }

    pub async fn get_user(&self) -> Option<UserSnapshot> {
        let result = self.read_user().await;
        report("get_user", result).flatten()
    }

    pub async fn get_session(&self) -> Option<SessionRecord> {
        let result = self.try_get_session().await;
        report("get_session", result).flatten()
    }

    // Like `get_session` but hands storage failures to the caller
    pub async fn try_get_session(&self) -> Result<Option<SessionRecord>, StorageError> {
        let token = self.storage.get_item(TOKEN_KEY).await?;
        let user = self.read_user().await?;
        let (token, user) = match (token, user) {
            (Some(token), Some(user)) => (token, user),
            _ => return Ok(None),
        };

        let issued_at = match self.storage.get_item(SESSION_META_KEY).await? {
            Some(raw) => serde_json::from_str::<SessionMeta>(&raw)?.issued_at,
            None => self.clock.now(),
        };

        let expires_at = match issued_at.checked_add_signed(self.ttl) {
            Some(expires_at) => expires_at,
            None => {
                tracing::warn!(%issued_at, "session expiry out of range; treating as no session");
                return Ok(None);
            }
        };

        Ok(Some(SessionRecord {
            token,
            user,
            expires_at,
        }))
    }

    pub async fn clear_session(&self) -> bool {
        let result = self
            .storage
            .remove_items(&[TOKEN_KEY, USER_KEY, SESSION_META_KEY])
            .await;
        let cleared = report("clear_session", result).is_some();
        if cleared {
            tracing::info!("session cleared");
        }
        cleared
    }

    pub async fn has_session(&self) -> bool {
        self.get_session().await.is_some()
    }

    async fn write_token(&self, token: &str) -> Result<(), StorageError> {
        self.storage.set_item(TOKEN_KEY, token.to_string()).await?;
        let meta = SessionMeta {
            issued_at: self.clock.now(),
        };
        self.storage
            .set_item(SESSION_META_KEY, serde_json::to_string(&meta)?)
            .await
    }

    async fn write_user(&self, user: &UserSnapshot) -> Result<(), StorageError> {
        self.storage
            .set_item(USER_KEY, serde_json::to_string(user)?)
            .await
    }

    async fn read_user(&self) -> Result<Option<UserSnapshot>, StorageError> {
        match self.storage.get_item(USER_KEY).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

fn report<T>(operation: &str, result: Result<T, StorageError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(operation, %error, "session storage failure treated as miss");
            None
        }
    }
}
