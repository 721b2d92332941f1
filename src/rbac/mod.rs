//! Role-based access control.
//!
//! A [`RoleHierarchy`] is computed once from configuration and never
//! mutated; the [`AuthorizationEngine`] answers both visibility
//! (`tools/list`) and permission (`tools/call`) questions from the same
//! expanded [`PermissionSet`], so the two decisions cannot drift apart.

mod engine;
mod hierarchy;

pub use engine::{AuthorizationEngine, Decision};
pub use hierarchy::RoleHierarchy;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A role identifier (e.g. `employee`, `manager`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    /// Create a role from its identifier
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Role identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The roles a principal effectively holds: its primary role plus
/// everything that role subsumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    roles: HashSet<Role>,
}

impl PermissionSet {
    /// Empty set; grants access to public tools only
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the set holds `role`
    #[must_use]
    pub fn contains(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// Whether any of `required` is held
    pub fn intersects<'a>(&self, mut required: impl Iterator<Item = &'a Role>) -> bool {
        required.any(|r| self.roles.contains(r))
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Sorted role identifiers, for logs
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.roles.iter().map(Role::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl FromIterator<Role> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        Self {
            roles: iter.into_iter().collect(),
        }
    }
}
