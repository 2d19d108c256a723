//! SP session record persisted at SSO time.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Longest accepted session lifetime (ten years).
pub const MAX_SESSION_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

const SESSION_ID_LEN: usize = 16;

/// Random SP session key, carried in the session cookie as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId([u8; SESSION_ID_LEN]);

impl SessionId {
    pub fn new() -> Self {
        Self(rand::random())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// `None` unless `s` is exactly 32 hex digits.
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut key = [0u8; SESSION_ID_LEN];
        hex::decode_to_slice(s, &mut key).ok()?;
        Some(Self(key))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A service provider session together with the assertion that established it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpSession {
    pub id: SessionId,

    /// SAML NameID of the subject.
    pub user_id: String,

    pub name_id_format: Option<String>,

    /// AuthnStatement session index, needed for Single Logout.
    pub session_index: Option<String>,

    pub idp_entity_id: String,

    /// Assertion XML exactly as received at SSO time.
    pub assertion_xml: String,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,

    pub client_ip: Option<String>,
}

impl SpSession {
    /// Build a session that expires `ttl_secs` from now.
    ///
    /// Fails for a zero TTL or one above [`MAX_SESSION_TTL_SECS`].
    pub fn new(
        user_id: String,
        idp_entity_id: String,
        assertion_xml: String,
        ttl_secs: u64,
    ) -> Result<Self> {
        let now = Utc::now();
        let expires_at = expiry_after(now, ttl_secs)?;

        Ok(Self {
            id: SessionId::new(),
            user_id,
            name_id_format: None,
            session_index: None,
            idp_entity_id,
            assertion_xml,
            created_at: now,
            expires_at,
            last_accessed: now,
            client_ip: None,
        })
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
    }

    /// Raw assertion bytes, as handed to the role extractor.
    pub fn assertion_bytes(&self) -> &[u8] {
        self.assertion_xml.as_bytes()
    }
}

fn check_ttl(ttl_secs: u64) -> Result<()> {
    if ttl_secs == 0 {
        bail!("session TTL must be greater than zero");
    }
    if ttl_secs > MAX_SESSION_TTL_SECS {
        bail!(
            "session TTL of {} seconds exceeds the maximum of {}",
            ttl_secs,
            MAX_SESSION_TTL_SECS
        );
    }
    Ok(())
}

fn expiry_after(now: DateTime<Utc>, ttl_secs: u64) -> Result<DateTime<Utc>> {
    check_ttl(ttl_secs)?;

    i64::try_from(ttl_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| anyhow!("session TTL of {} seconds is out of range", ttl_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_ttl(ttl_secs: u64) -> Result<SpSession> {
        SpSession::new(
            "user@example.com".to_string(),
            "https://idp.example.com".to_string(),
            "<Assertion/>".to_string(),
            ttl_secs,
        )
    }

    #[test]
    fn test_session_id_hex() {
        let id = SessionId::new();
        let hex = id.to_string();
        assert_eq!(hex.len(), 32);
        assert_eq!(SessionId::from_hex(&hex), Some(id));
    }

    #[test]
    fn test_session_id_rejects_bad_input() {
        assert!(SessionId::from_hex("not-valid-hex").is_none());
        assert!(SessionId::from_hex("abcd").is_none());
        assert!(SessionId::from_hex(&"ab".repeat(17)).is_none());
        assert!(SessionId::from_hex("").is_none());
    }

    #[test]
    fn test_new_session_is_live() {
        let mut session = session_with_ttl(3600).unwrap();
        assert!(!session.is_expired());
        assert_eq!(session.assertion_bytes(), b"<Assertion/>");

        session.expires_at = Utc::now() - TimeDelta::seconds(10);
        assert!(session.is_expired());
    }

    #[test]
    fn test_ttl_at_maximum() {
        let session = session_with_ttl(MAX_SESSION_TTL_SECS).unwrap();
        assert!(!session.is_expired());
        assert!(session.expires_at > Utc::now() + TimeDelta::days(365 * 9));
    }

    #[test]
    fn test_ttl_out_of_range() {
        assert!(session_with_ttl(0).is_err());
        assert!(session_with_ttl(MAX_SESSION_TTL_SECS + 1).is_err());
        // would wrap negative as i64, or overflow TimeDelta
        assert!(session_with_ttl(u64::MAX).is_err());
        assert!(session_with_ttl(10_000_000_000_000_000).is_err());
    }
}
