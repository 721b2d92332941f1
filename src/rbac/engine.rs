//! Visibility and call decisions.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{PermissionSet, RoleHierarchy};
use crate::gateway::auth::Principal;
use crate::registry::ToolDescriptor;

/// Outcome of a call-permission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The permission set intersects the tool's required roles
    Allow,
    /// It does not
    Deny,
}

impl Decision {
    /// Whether the call may proceed
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Pure authorization engine over a fixed [`RoleHierarchy`].
///
/// Listing and calling share [`AuthorizationEngine::permits`], so a tool
/// is callable exactly when it would be listed (enabled flag aside).
#[derive(Debug, Clone, Default)]
pub struct AuthorizationEngine {
    hierarchy: RoleHierarchy,
}

impl AuthorizationEngine {
    /// Create an engine over a computed hierarchy
    #[must_use]
    pub fn new(hierarchy: RoleHierarchy) -> Self {
        Self { hierarchy }
    }

    /// Hierarchy in use
    #[must_use]
    pub fn hierarchy(&self) -> &RoleHierarchy {
        &self.hierarchy
    }

    /// Expanded permissions of a principal.
    ///
    /// A role the hierarchy does not know yields an empty set, which only
    /// reaches public tools.
    #[must_use]
    pub fn permissions(&self, principal: &Principal) -> PermissionSet {
        if let Some(perms) = self.hierarchy.permissions(&principal.role) {
            perms.clone()
        } else {
            warn!(
                principal = %principal.id,
                role = %principal.role,
                "Principal has a role outside the hierarchy"
            );
            PermissionSet::empty()
        }
    }

    /// Whether `permissions` reach `tool`, ignoring the enabled flag
    #[must_use]
    pub fn permits(&self, permissions: &PermissionSet, tool: &ToolDescriptor) -> bool {
        tool.is_public() || permissions.intersects(tool.required_roles().iter())
    }

    /// Tools to show in `tools/list`: enabled and permitted, order preserved.
    ///
    /// Stricter than [`permits`](Self::permits) alone: a disabled tool is
    /// left out even for roles that may call it, so listings only advertise
    /// tools that would currently run.
    #[must_use]
    pub fn filter_for_listing(
        &self,
        permissions: &PermissionSet,
        tools: Vec<Arc<ToolDescriptor>>,
    ) -> Vec<Arc<ToolDescriptor>> {
        let total = tools.len();
        let visible: Vec<_> = tools
            .into_iter()
            .filter(|t| t.is_enabled() && self.permits(permissions, t))
            .collect();
        debug!(
            visible = visible.len(),
            total,
            roles = ?permissions.names(),
            "Filtered tool list"
        );
        visible
    }

    /// Decide a `tools/call`
    #[must_use]
    pub fn authorize_call(&self, permissions: &PermissionSet, tool: &ToolDescriptor) -> Decision {
        if self.permits(permissions, tool) {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}
