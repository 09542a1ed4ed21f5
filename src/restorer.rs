// Startup session restore with a minimum splash duration

use crate::session_store::{SessionStore, UserSnapshot};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// Receives the result of a restore; normally the app-wide auth state
pub trait AuthStateSink: Send + Sync {
    fn hydrate(&self, user: UserSnapshot);

    fn set_unauthenticated(&self);

    fn report_error(&self, message: String);

    fn mark_ready(&self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    Authenticated(UserSnapshot),
    Expired,
    Anonymous,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthSnapshot {
    pub user: Option<UserSnapshot>,
    pub error: Option<String>,
    pub ready: bool,
}

impl AuthSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

// In-process auth state that UI code can read after a restore
#[derive(Debug, Default)]
pub struct SharedAuthState {
    inner: RwLock<AuthSnapshot>,
}

impl SharedAuthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.read().clone()
    }
}

impl AuthStateSink for SharedAuthState {
    fn hydrate(&self, user: UserSnapshot) {
        let mut state = self.inner.write();
        state.user = Some(user);
        state.error = None;
    }

    fn set_unauthenticated(&self) {
        self.inner.write().user = None;
    }

    fn report_error(&self, message: String) {
        self.inner.write().error = Some(message);
    }

    fn mark_ready(&self) {
        self.inner.write().ready = true;
    }
}

// Restores the persisted session once per launch.
//
// The stored token is trusted until its synthesized expiry; it is not
// re-validated against the backend. Readiness is never signalled before
// `min_splash` has passed since `restore` was called.
pub struct SessionRestorer {
    store: Arc<SessionStore>,
    min_splash: Duration,
    purge_expired: bool,
}

impl SessionRestorer {
    pub fn new(store: Arc<SessionStore>, min_splash: Duration) -> Self {
        Self {
            store,
            min_splash,
            purge_expired: true,
        }
    }

    // Keep expired sessions on disk instead of clearing them
    pub fn keep_expired(mut self) -> Self {
        self.purge_expired = false;
        self
    }

    pub async fn restore(&self, sink: &dyn AuthStateSink) -> RestoreOutcome {
        let started = Instant::now();

        let outcome = match self.store.try_get_session().await {
            Ok(Some(session)) if !session.is_expired(self.store.clock().now()) => {
                tracing::info!(user_id = %session.user.id, "restored session");
                sink.hydrate(session.user.clone());
                RestoreOutcome::Authenticated(session.user)
            }
            Ok(Some(session)) => {
                tracing::info!(expired_at = %session.expires_at, "stored session expired");
                if self.purge_expired {
                    self.store.clear_session().await;
                }
                sink.set_unauthenticated();
                RestoreOutcome::Expired
            }
            Ok(None) => {
                sink.set_unauthenticated();
                RestoreOutcome::Anonymous
            }
            Err(error) => {
                tracing::warn!(%error, "session restore failed");
                let message = format!("Could not restore session: {}", error);
                sink.set_unauthenticated();
                sink.report_error(message.clone());
                RestoreOutcome::Failed(message)
            }
        };

        tokio::time::sleep_until(started + self.min_splash).await;
        sink.mark_ready();
        outcome
    }
}
