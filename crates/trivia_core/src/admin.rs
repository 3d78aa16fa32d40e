//! crates/trivia_core/src/admin.rs
//!
//! The admin gate: every data-revealing or mutating operation runs behind
//! `AdminGate::authorize`.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::domain::{AdminGrant, Principal};
use crate::ports::{IdentityVerifier, PortError, PortResult};

/// Normalized (trimmed, lower-cased) admin email addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminAllowList(HashSet<String>);

impl AdminAllowList {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        )
    }

    /// Parses a comma-separated list such as `ADMIN_EMAILS`.
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    pub fn contains(&self, email: &str) -> bool {
        self.0.contains(&email.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Verifies bearer tokens and admits allow-listed emails or holders of the `admin` claim.
pub struct AdminGate {
    verifier: Arc<dyn IdentityVerifier>,
    allow_list: AdminAllowList,
}

impl AdminGate {
    pub fn new(verifier: Arc<dyn IdentityVerifier>, allow_list: AdminAllowList) -> Self {
        Self {
            verifier,
            allow_list,
        }
    }

    pub async fn authorize(&self, bearer_token: &str) -> PortResult<Principal> {
        if bearer_token.trim().is_empty() {
            return Err(PortError::Unauthorized("No token provided".to_string()));
        }

        let identity = self
            .verifier
            .verify_id_token(bearer_token)
            .await
            .map_err(|e| match e {
                // Identity service outages are not the caller's fault.
                PortError::Timeout(_) | PortError::Unexpected(_) => e,
                PortError::Unauthorized(msg) => {
                    PortError::Unauthorized(format!("Authentication failed: {msg}"))
                }
                other => PortError::Unauthorized(format!("Authentication failed: {other}")),
            })?;

        let email = identity.email.map(|e| e.to_lowercase());
        let grant = if email.as_deref().is_some_and(|e| self.allow_list.contains(e)) {
            Some(AdminGrant::AllowList)
        } else if identity.admin_claim {
            Some(AdminGrant::Claim)
        } else {
            None
        };

        match grant {
            Some(grant) => Ok(Principal {
                uid: identity.uid,
                email,
                grant,
            }),
            None => {
                warn!(uid = %identity.uid, email = ?email, "Rejected non-admin principal");
                Err(PortError::Forbidden("Admin access required".to_string()))
            }
        }
    }
}
