//! Who is at the keyboard. Sign-in itself happens elsewhere; this module
//! only decides between demo mode and a descriptor handed over by the
//! identity provider, and reads the local registered-user list.

use std::path::Path;

use anyhow::bail;
use tracing::warn;

use crate::models::UserDescriptor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthContext {
    /// No identity provider configured.
    Demo(UserDescriptor),
    SignedIn(UserDescriptor),
}

impl AuthContext {
    /// With no provider key the client runs as the demo user. With a key,
    /// the provider must have supplied both the name and the email.
    pub fn resolve(
        provider_key: Option<&str>,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> anyhow::Result<Self> {
        let configured = provider_key.map(str::trim).filter(|key| !key.is_empty());
        if configured.is_none() {
            return Ok(AuthContext::Demo(UserDescriptor {
                display_name: "Demo User".to_string(),
                email: "demo@example.com".to_string(),
            }));
        }

        let present = |value: Option<&str>| value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        match (present(display_name), present(email)) {
            (Some(display_name), Some(email)) => {
                Ok(AuthContext::SignedIn(UserDescriptor { display_name, email }))
            }
            _ => bail!(
                "an identity provider is configured but no signed-in user was supplied; \
                 set FRAUD_USER_NAME and FRAUD_USER_EMAIL"
            ),
        }
    }

    pub fn user(&self) -> &UserDescriptor {
        match self {
            AuthContext::Demo(user) | AuthContext::SignedIn(user) => user,
        }
    }

    pub fn is_demo(&self) -> bool {
        matches!(self, AuthContext::Demo(_))
    }
}

/// Number of entries in the registered-user list. Read-only; a missing
/// file counts as zero.
pub fn registered_user_count(path: &Path) -> usize {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cannot read user registry");
            return 0;
        }
    };

    match serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
        Ok(users) => users.len(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "user registry is not a JSON array");
            0
        }
    }
}
