//! Post-login hook configuration.

use serde::{Deserialize, Serialize};

use crate::roles::{DEFAULT_MAX_NODES, DEFAULT_ROLE_ATTRIBUTE};
use crate::session::{DEFAULT_CLEANUP_INTERVAL_SECS, MAX_SESSION_TTL_SECS};

/// What the hook does when an assertion cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Log the failure and continue with no roles.
    #[default]
    Degrade,
    /// Surface the failure to the login pipeline.
    FailClosed,
}

/// Post-login role extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookConfig {
    /// SAML attribute whose values are extracted (matched case-sensitively).
    #[serde(default = "default_attribute_name")]
    pub attribute_name: String,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Assertions larger than this are not parsed.
    #[serde(default = "default_max_assertion_bytes")]
    pub max_assertion_bytes: usize,

    /// Node limit handed to the XML parser.
    #[serde(default = "default_max_nodes")]
    pub max_nodes: u32,

    /// Cookie carrying the SP session ID.
    #[serde(default = "default_cookie_name")]
    pub session_cookie_name: String,

    /// Session store path (redb database file).
    #[serde(default = "default_session_store_path")]
    pub session_store_path: String,

    /// Session TTL in seconds (default: 8 hours).
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_attribute_name() -> String {
    DEFAULT_ROLE_ATTRIBUTE.to_string()
}

fn default_max_assertion_bytes() -> usize {
    512 * 1024
}

fn default_max_nodes() -> u32 {
    DEFAULT_MAX_NODES
}

fn default_cookie_name() -> String {
    "saml_sp_session".to_string()
}

fn default_session_store_path() -> String {
    "/var/lib/saml-role-agent/sessions.redb".to_string()
}

fn default_session_ttl() -> u64 {
    8 * 60 * 60 // 8 hours
}

fn default_cleanup_interval() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_SECS
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            attribute_name: default_attribute_name(),
            failure_policy: FailurePolicy::default(),
            max_assertion_bytes: default_max_assertion_bytes(),
            max_nodes: default_max_nodes(),
            session_cookie_name: default_cookie_name(),
            session_store_path: default_session_store_path(),
            session_ttl_secs: default_session_ttl(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl HookConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.attribute_name.is_empty() {
            return Err("attribute_name must not be empty".to_string());
        }

        if self.max_assertion_bytes == 0 {
            return Err("max_assertion_bytes must be greater than zero".to_string());
        }

        if self.max_nodes == 0 {
            return Err("max_nodes must be greater than zero".to_string());
        }

        if self.session_cookie_name.is_empty() {
            return Err("session_cookie_name must not be empty".to_string());
        }

        if self.session_ttl_secs == 0 {
            return Err("session_ttl_secs must be greater than zero".to_string());
        }

        if self.session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(format!(
                "session_ttl_secs must not exceed {}",
                MAX_SESSION_TTL_SECS
            ));
        }

        if self.cleanup_interval_secs == 0 {
            return Err("cleanup_interval_secs must be greater than zero".to_string());
        }

        Ok(())
    }
}

/// Partial JSON configuration, merged over the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct HookConfigJson {
    pub attribute_name: Option<String>,
    pub failure_policy: Option<FailurePolicy>,
    pub max_assertion_bytes: Option<usize>,
    pub max_nodes: Option<u32>,
    pub session_cookie_name: Option<String>,
    pub session_store_path: Option<String>,
    pub session_ttl_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
}

impl HookConfigJson {
    /// Merge JSON config into existing config.
    pub fn apply_to(&self, config: &mut HookConfig) {
        if let Some(ref name) = self.attribute_name {
            config.attribute_name = name.clone();
        }
        if let Some(policy) = self.failure_policy {
            config.failure_policy = policy;
        }
        if let Some(bytes) = self.max_assertion_bytes {
            config.max_assertion_bytes = bytes;
        }
        if let Some(nodes) = self.max_nodes {
            config.max_nodes = nodes;
        }
        if let Some(ref name) = self.session_cookie_name {
            config.session_cookie_name = name.clone();
        }
        if let Some(ref path) = self.session_store_path {
            config.session_store_path = path.clone();
        }
        if let Some(ttl) = self.session_ttl_secs {
            config.session_ttl_secs = ttl;
        }
        if let Some(interval) = self.cleanup_interval_secs {
            config.cleanup_interval_secs = interval;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HookConfig::default();
        assert_eq!(config.attribute_name, "Role");
        assert_eq!(config.failure_policy, FailurePolicy::Degrade);
        assert_eq!(config.session_ttl_secs, 8 * 60 * 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = HookConfig::default();
        config.attribute_name = String::new();
        assert!(config.validate().is_err());

        let mut config = HookConfig::default();
        config.max_assertion_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = HookConfig::default();
        config.session_cookie_name = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_ttl_bounds() {
        let mut config = HookConfig::default();

        config.session_ttl_secs = 0;
        assert!(config.validate().is_err());

        config.session_ttl_secs = 1;
        assert!(config.validate().is_ok());

        config.session_ttl_secs = MAX_SESSION_TTL_SECS;
        assert!(config.validate().is_ok());

        config.session_ttl_secs = MAX_SESSION_TTL_SECS + 1;
        assert!(config.validate().is_err());

        config.session_ttl_secs = u64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_merge() {
        let json = r#"{
            "attribute-name": "memberOf",
            "failure-policy": "fail-closed",
            "max-nodes": 5000
        }"#;
        let partial: HookConfigJson = serde_json::from_str(json).unwrap();

        let mut config = HookConfig::default();
        partial.apply_to(&mut config);

        assert_eq!(config.attribute_name, "memberOf");
        assert_eq!(config.failure_policy, FailurePolicy::FailClosed);
        assert_eq!(config.max_nodes, 5000);
        // untouched fields keep their defaults
        assert_eq!(config.session_cookie_name, "saml_sp_session");
    }

    #[test]
    fn test_full_config_rejects_unknown_fields() {
        let json = r#"{"attribute_name": "Role", "bogus": true}"#;
        assert!(serde_json::from_str::<HookConfig>(json).is_err());

        let json = r#"{"attribute_name": "Role"}"#;
        let config: HookConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_assertion_bytes, 512 * 1024);
    }
}
