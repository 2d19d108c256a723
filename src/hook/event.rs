//! Login lifecycle event delivered to the hook.

use serde::Serialize;
use std::collections::HashMap;

use crate::roles::ExtractionError;

/// Inbound request as seen once the SP session has been established.
#[derive(Debug, Clone, Default)]
pub struct LoginEvent {
    pub headers: HashMap<String, Vec<String>>,
    pub client_ip: Option<String>,
}

impl LoginEvent {
    pub fn new(headers: HashMap<String, Vec<String>>) -> Self {
        Self {
            headers,
            client_ip: None,
        }
    }

    /// All values of a header, matched case-insensitively.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .flat_map(|(_, values)| values.iter().map(String::as_str))
    }
}

/// Outcome of one post-login hook run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportStatus {
    Extracted,
    NoSession,
    Degraded { kind: String, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleReport {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub attribute_name: String,
    pub roles: Vec<String>,
    #[serde(flatten)]
    pub status: ReportStatus,
}

/// Post-login hook failures.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// The session lookup itself failed.
    #[error("session lookup failed: {0:#}")]
    Lookup(anyhow::Error),

    #[error("assertion is {size} bytes, limit is {limit}")]
    AssertionTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl HookError {
    /// Log/report label for the failure.
    pub fn kind(&self) -> String {
        match self {
            HookError::Lookup(_) => "lookup_error".to_string(),
            HookError::AssertionTooLarge { .. } => "assertion_too_large".to_string(),
            HookError::Extraction(e) => e.kind().to_string(),
        }
    }
}
