//! Post-login role extraction hook.
//!
//! Runs after the SP session is established: resolves the session, reads the
//! cached assertion and reports the roles it asserts. Nothing is assigned.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::config::{FailurePolicy, HookConfig};
use super::event::{HookError, LoginEvent, ReportStatus, RoleReport};
use crate::roles::AssertionRoleExtractor;
use crate::session::{SessionLookup, SpSession};

pub struct PostLoginAction {
    lookup: Arc<dyn SessionLookup>,
    extractor: AssertionRoleExtractor,
    config: HookConfig,
}

impl PostLoginAction {
    pub fn new(lookup: Arc<dyn SessionLookup>, config: HookConfig) -> Result<Self> {
        config.validate().map_err(|e| anyhow!(e))?;

        let extractor = AssertionRoleExtractor::new(config.attribute_name.clone(), config.max_nodes);

        Ok(Self {
            lookup,
            extractor,
            config,
        })
    }

    /// Handle one login event.
    ///
    /// Lookup failures are always returned. Assertion failures are returned
    /// only under [`FailurePolicy::FailClosed`]; otherwise the report carries
    /// an empty role set and the failure kind.
    pub fn process(&self, event: &LoginEvent) -> Result<RoleReport, HookError> {
        let attribute_name = self.config.attribute_name.clone();

        let session = match self.lookup.lookup(event) {
            Ok(Some(session)) => session,
            Ok(None) => {
                warn!(
                    client_ip = ?event.client_ip,
                    "No SAML SP session for login event, skipping role extraction"
                );
                return Ok(RoleReport {
                    session_id: None,
                    user_id: None,
                    attribute_name,
                    roles: Vec::new(),
                    status: ReportStatus::NoSession,
                });
            }
            Err(e) => {
                error!(error = %e, "SAML SP session lookup failed");
                return Err(HookError::Lookup(e));
            }
        };

        let session_id = session.id.to_hex();

        match self.extract(&session) {
            Ok(roles) => {
                info!(
                    event = "saml_roles_extracted",
                    user_id = %session.user_id,
                    session_id = %session_id,
                    count = roles.len(),
                    "SAML role attributes extracted"
                );
                Ok(RoleReport {
                    session_id: Some(session_id),
                    user_id: Some(session.user_id),
                    attribute_name,
                    roles,
                    status: ReportStatus::Extracted,
                })
            }
            Err(e) => match self.config.failure_policy {
                FailurePolicy::Degrade => {
                    warn!(
                        event = "saml_roles_failed",
                        user_id = %session.user_id,
                        session_id = %session_id,
                        error_kind = %e.kind(),
                        error = %e,
                        "Role extraction failed, continuing with no roles"
                    );
                    Ok(RoleReport {
                        session_id: Some(session_id),
                        user_id: Some(session.user_id),
                        attribute_name,
                        roles: Vec::new(),
                        status: ReportStatus::Degraded {
                            kind: e.kind(),
                            message: e.to_string(),
                        },
                    })
                }
                FailurePolicy::FailClosed => {
                    error!(
                        event = "saml_roles_failed",
                        user_id = %session.user_id,
                        session_id = %session_id,
                        error_kind = %e.kind(),
                        error = %e,
                        "Role extraction failed"
                    );
                    Err(e)
                }
            },
        }
    }

    fn extract(&self, session: &SpSession) -> Result<Vec<String>, HookError> {
        let raw = session.assertion_bytes();
        if raw.len() > self.config.max_assertion_bytes {
            return Err(HookError::AssertionTooLarge {
                size: raw.len(),
                limit: self.config.max_assertion_bytes,
            });
        }

        Ok(self.extractor.extract(raw)?)
    }
}
