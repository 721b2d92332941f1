//! Authentication for the RBAC gateway
//!
//! Resolves the `Authorization: Bearer <token>` header to a [`Principal`]
//! through a [`CredentialStore`]. Resolution happens once per request,
//! before the middleware chain is entered; a request that fails here never
//! reaches a middleware unit or tool handler.

use std::sync::Arc;

use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::rbac::Role;
use crate::{Error, Result};

/// Resolved identity and role for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// Stable user identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Primary role
    pub role: Role,
    /// Rate limit (requests per minute, 0 = unlimited)
    #[serde(skip)]
    pub rate_limit: u32,
}

impl Principal {
    /// Create a principal with no rate limit
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: impl Into<Role>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: role.into(),
            rate_limit: 0,
        }
    }
}

/// Opaque credential lookup.
pub trait CredentialStore: Send + Sync + 'static {
    /// Principal bound to `token`, if any
    fn lookup(&self, token: &str) -> Option<Principal>;
}

/// Static token table built from configuration
#[derive(Debug, Default)]
pub struct StaticCredentialStore {
    entries: Vec<(String, Principal)>,
}

impl StaticCredentialStore {
    /// Build from the `auth` configuration section (tokens expanded).
    ///
    /// Users whose token cannot be resolved are left out.
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        let entries = config
            .users
            .iter()
            .filter_map(|u| {
                let Some(token) = u.resolve_token() else {
                    warn!(user = %u.id, "Token not resolvable, user disabled");
                    return None;
                };
                let name = if u.name.is_empty() { u.id.clone() } else { u.name.clone() };
                let principal = Principal {
                    id: u.id.clone(),
                    name,
                    role: Role::new(u.role.as_str()),
                    rate_limit: u.rate_limit,
                };
                Some((token, principal))
            })
            .collect();
        Self { entries }
    }

    /// Add a token binding
    #[must_use]
    pub fn with(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.entries.push((token.into(), principal));
        self
    }

    /// Number of known credentials
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no credentials are configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CredentialStore for StaticCredentialStore {
    fn lookup(&self, token: &str) -> Option<Principal> {
        // Every entry is compared so timing does not reveal which one matched.
        let mut found = None;
        for (candidate, principal) in &self.entries {
            if bool::from(candidate.as_bytes().ct_eq(token.as_bytes())) && found.is_none() {
                found = Some(principal.clone());
            }
        }
        found
    }
}

/// Extract the token from a `Bearer <token>` header value
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Maps a presented credential to a [`Principal`]
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
}

impl Authenticator {
    /// Create an authenticator over a credential store
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Resolve the raw `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Returns `Error::Authentication` if the header is missing, not a
    /// bearer credential, or unknown to the store.
    pub fn resolve(&self, authorization: Option<&str>) -> Result<Principal> {
        let Some(header) = authorization else {
            warn!("Missing Authorization header");
            return Err(Error::Authentication("missing Authorization header".to_string()));
        };

        let Some(token) = bearer_token(header) else {
            warn!("Malformed Authorization header");
            return Err(Error::Authentication("malformed bearer credential".to_string()));
        };

        match self.store.lookup(token) {
            Some(principal) => {
                debug!(principal = %principal.id, role = %principal.role, "Authenticated request");
                Ok(principal)
            }
            None => {
                warn!("Invalid token");
                Err(Error::Authentication("unknown credential".to_string()))
            }
        }
    }
}

/// Constant-time admin token check
#[must_use]
pub fn admin_token_matches(expected: &str, authorization: Option<&str>) -> bool {
    authorization
        .and_then(bearer_token)
        .is_some_and(|presented| bool::from(expected.as_bytes().ct_eq(presented.as_bytes())))
}
