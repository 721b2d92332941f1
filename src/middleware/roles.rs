//! Permission resolution.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Fact, Middleware, Next, RequestContext, Response};
use crate::Result;
use crate::rbac::AuthorizationEngine;

/// Expands the principal's role into a [`PermissionSet`] on the context.
///
/// [`PermissionSet`]: crate::rbac::PermissionSet
pub struct RoleResolver {
    engine: Arc<AuthorizationEngine>,
}

impl RoleResolver {
    /// Create the unit
    #[must_use]
    pub fn new(engine: Arc<AuthorizationEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Middleware for RoleResolver {
    fn name(&self) -> &'static str {
        "roles"
    }

    fn requires(&self) -> &'static [Fact] {
        &[Fact::Principal]
    }

    fn provides(&self) -> &'static [Fact] {
        &[Fact::Permissions]
    }

    async fn intercept(&self, ctx: &mut RequestContext, next: Next<'_>) -> Result<Response> {
        let permissions = self.engine.permissions(ctx.principal());
        debug!(
            request_id = %ctx.request_id,
            role = %ctx.principal().role,
            permissions = ?permissions.names(),
            "Resolved permissions"
        );
        ctx.permissions = Some(permissions);
        next.run(ctx).await
    }
}
