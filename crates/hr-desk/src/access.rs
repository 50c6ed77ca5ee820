//! Role → section access control.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::session::{Caller, SessionToken};

/// Named functional areas used as the unit of access control.
pub mod section {
    pub const INTERVIEWS: &str = "interviews";
    pub const QUERIES: &str = "queries";
    pub const REPORTS: &str = "reports";
    pub const REPORTS_BUILD: &str = "reports_build";
}

const ADMIN_ROLE: &str = "admin";
const WILDCARD: &str = "*";

#[derive(Debug, thiserror::Error)]
pub enum AccessPolicyError {
    #[error("failed to read access policy {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("access policy is not a role -> sections map: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Immutable role → allowed-sections mapping, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    roles: HashMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny {
        role: String,
        section: String,
        allowed: Vec<String>,
    },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl AccessPolicy {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AccessPolicyError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| AccessPolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, AccessPolicyError> {
        let parsed: HashMap<String, Vec<String>> = serde_json::from_str(raw)?;
        Ok(Self::from_entries(parsed))
    }

    pub fn from_entries<I, R, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (R, S)>,
        R: AsRef<str>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        let mut roles: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (role, sections) in entries {
            roles
                .entry(role.as_ref().trim().to_lowercase())
                .or_default()
                .extend(sections.into_iter().map(Into::into));
        }
        Self { roles }
    }

    pub fn allowed_sections(&self, role: &str) -> Vec<String> {
        self.roles
            .get(&role.trim().to_lowercase())
            .map(|sections| sections.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// `admin` always passes, `*` grants everything, otherwise literal membership.
    pub fn check(&self, role: &str, section: &str) -> AccessDecision {
        let normalized = role.trim().to_lowercase();
        if normalized == ADMIN_ROLE {
            return AccessDecision::Allow;
        }

        let allowed = self.roles.get(&normalized);
        let granted = allowed
            .is_some_and(|sections| sections.contains(WILDCARD) || sections.contains(section));
        if granted {
            AccessDecision::Allow
        } else {
            AccessDecision::Deny {
                role: role.to_string(),
                section: section.to_string(),
                allowed: allowed
                    .map(|sections| sections.iter().cloned().collect())
                    .unwrap_or_default(),
            }
        }
    }
}

/// Why a caller was turned away. Never fatal; callers redirect and flash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AccessDenied {
    #[error("authentication required")]
    NotAuthenticated,
    #[error("no access to section '{section}'")]
    Forbidden {
        #[serde(skip)]
        token: SessionToken,
        role: String,
        section: String,
    },
}

impl AccessDenied {
    /// Session to attach the flash message to, when there is one.
    pub fn session(&self) -> Option<&SessionToken> {
        match self {
            Self::NotAuthenticated => None,
            Self::Forbidden { token, .. } => Some(token),
        }
    }
}

/// Entry check shared by every workflow.
#[derive(Debug, Clone)]
pub struct AccessGate {
    policy: Arc<AccessPolicy>,
}

impl AccessGate {
    pub fn new(policy: Arc<AccessPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// A missing caller short-circuits to `NotAuthenticated` before the section
    /// is looked at.
    pub fn admit<'c>(
        &self,
        caller: Option<&'c Caller>,
        section: &str,
    ) -> Result<&'c Caller, AccessDenied> {
        let caller = caller.ok_or(AccessDenied::NotAuthenticated)?;
        match self.policy.check(&caller.identity.role, section) {
            AccessDecision::Allow => Ok(caller),
            AccessDecision::Deny {
                role,
                section,
                allowed,
            } => {
                warn!(
                    target: "hr_desk::audit",
                    role = %role,
                    required = %section,
                    allowed = ?allowed,
                    login = %caller.identity.login,
                    "access denied"
                );
                Err(AccessDenied::Forbidden {
                    token: caller.token.clone(),
                    role,
                    section,
                })
            }
        }
    }
}
