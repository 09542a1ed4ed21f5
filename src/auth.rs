// Bearer token injection for outgoing requests

use crate::session_store::SessionStore;
use crate::transport::Headers;
use std::collections::HashSet;
use std::sync::Arc;

pub const AUTHORIZATION_HEADER: &str = "Authorization";

// Adds `Authorization: Bearer <token>` to requests that need it.
//
// Endpoints are identified by their unrendered template (`/Auth/Login`, not
// the final URL) and compared exactly against an allow-list of public
// endpoints. Public endpoints never trigger a session lookup.
pub struct AuthInjector {
    session_store: Arc<SessionStore>,
    public_endpoints: HashSet<String>,
}

impl AuthInjector {
    pub fn new<I, S>(session_store: Arc<SessionStore>, public_endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            session_store,
            public_endpoints: public_endpoints.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_public(&self, endpoint: &str) -> bool {
        self.public_endpoints.contains(endpoint)
    }

    pub async fn inject(&self, mut headers: Headers, endpoint: &str) -> Headers {
        if self.is_public(endpoint) {
            return headers;
        }

        if let Some(token) = self.session_store.get_token().await {
            headers.insert(AUTHORIZATION_HEADER.to_string(), format!("Bearer {}", token));
        }
        headers
    }
}
