// Session lifecycle endpoints: login, registration, token refresh, profile and logout

use crate::config::{FORGOT_PASSWORD_ENDPOINT, LOGIN_ENDPOINT, REGISTER_ENDPOINT};
use crate::dispatcher::{Dispatcher, RequestDescriptor};
use crate::envelope::ApiEnvelope;
use crate::error::{normalize_error, NormalizedError, RawResponse, TransportError};
use crate::session_store::{SessionStore, UserSnapshot};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const REFRESH_TOKEN_ENDPOINT: &str = "/Auth/RefreshToken";
pub const LOGOUT_ENDPOINT: &str = "/Auth/Logout";
pub const PROFILE_ENDPOINT: &str = "/Users/Profile";

pub const SESSION_NOT_SAVED_MESSAGE: &str = "Could not save your session. Please try again.";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthPayload {
    token: String,
    user: UserSnapshot,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPayload {
    token: String,
}

pub struct AccountService {
    dispatcher: Arc<Dispatcher>,
    session_store: Arc<SessionStore>,
}

impl AccountService {
    pub fn new(dispatcher: Arc<Dispatcher>, session_store: Arc<SessionStore>) -> Self {
        Self {
            dispatcher,
            session_store,
        }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<UserSnapshot, NormalizedError> {
        let descriptor = RequestDescriptor::post(LOGIN_ENDPOINT).body(to_body(credentials));
        self.start_session(descriptor).await
    }

    pub async fn register(
        &self,
        registration: &Registration,
    ) -> Result<UserSnapshot, NormalizedError> {
        let descriptor = RequestDescriptor::post(REGISTER_ENDPOINT).body(to_body(registration));
        self.start_session(descriptor).await
    }

    // Returns the backend's confirmation message
    pub async fn forgot_password(&self, email: &str) -> Result<String, NormalizedError> {
        let raw = self
            .dispatcher
            .dispatch(RequestDescriptor::post(FORGOT_PASSWORD_ENDPOINT).body(json!({"email": email})))
            .await?;
        let envelope: ApiEnvelope<Value> = decode(raw)?;
        if !envelope.success {
            return Err(envelope_failure(envelope));
        }
        Ok(envelope.message)
    }

    // Swaps the stored token; the user snapshot is kept
    pub async fn refresh_token(&self) -> Result<String, NormalizedError> {
        let payload: TokenPayload = self
            .request_data(RequestDescriptor::post(REFRESH_TOKEN_ENDPOINT))
            .await?;
        persisted(self.session_store.save_token(&payload.token).await)?;
        tracing::info!("session token refreshed");
        Ok(payload.token)
    }

    pub async fn fetch_profile(&self) -> Result<UserSnapshot, NormalizedError> {
        let user: UserSnapshot = self
            .request_data(RequestDescriptor::get(PROFILE_ENDPOINT))
            .await?;
        persisted(self.session_store.save_user(&user).await)?;
        Ok(user)
    }

    // The local session is always cleared, even when the server call fails
    pub async fn logout(&self) {
        if let Err(error) = self
            .dispatcher
            .dispatch(RequestDescriptor::post(LOGOUT_ENDPOINT))
            .await
        {
            tracing::warn!(%error, "logout request failed; clearing local session anyway");
        }
        self.session_store.clear_session().await;
    }

    async fn start_session(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<UserSnapshot, NormalizedError> {
        let payload: AuthPayload = self.request_data(descriptor).await?;
        persisted(
            self.session_store
                .save_session(&payload.token, &payload.user)
                .await,
        )?;
        tracing::info!(user_id = %payload.user.id, "signed in");
        Ok(payload.user)
    }

    async fn request_data<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<T, NormalizedError> {
        let raw = self.dispatcher.dispatch(descriptor).await?;
        let envelope: ApiEnvelope<Value> = decode(raw)?;
        if !envelope.success {
            return Err(envelope_failure(envelope));
        }
        decode(envelope.data.unwrap_or(Value::Null))
    }
}

// The store has already logged the storage failure
fn persisted(saved: bool) -> Result<(), NormalizedError> {
    if saved {
        return Ok(());
    }
    Err(NormalizedError {
        message: SESSION_NOT_SAVED_MESSAGE.to_string(),
        original_response: None,
    })
}

fn to_body<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn decode<T: DeserializeOwned>(raw: Value) -> Result<T, NormalizedError> {
    serde_json::from_value(raw.clone()).map_err(|e| {
        normalize_error(
            &TransportError::Decode {
                message: e.to_string(),
                response: RawResponse::new(None, Some(raw)),
            },
            None,
            false,
        )
    })
}

// A 2xx envelope with success=false still has to reach callers as a normalized error
fn envelope_failure(envelope: ApiEnvelope<Value>) -> NormalizedError {
    let raw = serde_json::to_value(&envelope).unwrap_or(Value::Null);
    let message = envelope
        .error
        .filter(|e| !e.is_empty())
        .unwrap_or(envelope.message);
    normalize_error(
        &TransportError::Status {
            response: RawResponse::new(None, Some(raw)),
        },
        Some(message.as_str()),
        false,
    )
}
