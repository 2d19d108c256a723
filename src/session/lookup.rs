//! Resolving the SP session behind an inbound login request.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use super::store::SessionStore;
use super::types::{SessionId, SpSession};
use crate::hook::LoginEvent;

/// Maps a login event to the SP session persisted at SSO time.
///
/// `Ok(None)` means no session is associated with the request.
pub trait SessionLookup: Send + Sync {
    fn lookup(&self, event: &LoginEvent) -> Result<Option<SpSession>>;
}

/// Looks up sessions by the SP session cookie.
pub struct CookieSessionLookup {
    store: Arc<SessionStore>,
    cookie_name: String,
}

impl CookieSessionLookup {
    pub fn new(store: Arc<SessionStore>, cookie_name: impl Into<String>) -> Self {
        Self {
            store,
            cookie_name: cookie_name.into(),
        }
    }

    /// Parse the session id out of a `Cookie` header value.
    pub fn parse_session_cookie(&self, cookie_header: &str) -> Option<String> {
        let prefix = format!("{}=", self.cookie_name);
        cookie_header
            .split(';')
            .map(str::trim)
            .find_map(|part| part.strip_prefix(prefix.as_str()))
            .map(|value| value.to_string())
    }
}

impl SessionLookup for CookieSessionLookup {
    fn lookup(&self, event: &LoginEvent) -> Result<Option<SpSession>> {
        let Some(raw_id) = event
            .header_values("cookie")
            .find_map(|header| self.parse_session_cookie(header))
        else {
            debug!(cookie = %self.cookie_name, "No SP session cookie on request");
            return Ok(None);
        };

        let Some(id) = SessionId::from_hex(&raw_id) else {
            debug!("SP session cookie is not a valid session id");
            return Ok(None);
        };

        self.store.get(id)
    }
}
