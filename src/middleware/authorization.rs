//! Call gating and list filtering.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Fact, Method, Middleware, Next, RequestContext, Response};
use crate::rbac::AuthorizationEngine;
use crate::registry::ToolRegistry;
use crate::{Error, Result};

/// Admits or refuses `tools/call` and trims `tools/list` to what the
/// caller may see. Other methods pass through untouched.
///
/// A call is checked in this order: the tool exists, the caller may use
/// it, the tool is enabled. Unknown and forbidden tools produce errors that
/// render identically on the wire.
pub struct AuthorizationMiddleware {
    engine: Arc<AuthorizationEngine>,
    registry: Arc<ToolRegistry>,
}

impl AuthorizationMiddleware {
    /// Create the unit
    #[must_use]
    pub fn new(engine: Arc<AuthorizationEngine>, registry: Arc<ToolRegistry>) -> Self {
        Self { engine, registry }
    }
}

#[async_trait]
impl Middleware for AuthorizationMiddleware {
    fn name(&self) -> &'static str {
        "authorization"
    }

    fn requires(&self) -> &'static [Fact] {
        &[Fact::Permissions]
    }

    fn provides(&self) -> &'static [Fact] {
        &[Fact::Authorization]
    }

    async fn intercept(&self, ctx: &mut RequestContext, next: Next<'_>) -> Result<Response> {
        let permissions = ctx
            .permissions
            .clone()
            .ok_or_else(|| Error::Internal("permissions not resolved".to_string()))?;

        match &ctx.method {
            Method::CallTool { name, .. } => {
                let tool = self.registry.get(name)?;
                if !self.engine.authorize_call(&permissions, &tool).is_allowed() {
                    warn!(
                        request_id = %ctx.request_id,
                        principal = %ctx.principal().id,
                        role = %ctx.principal().role,
                        tool = %name,
                        "Tool call denied"
                    );
                    return Err(Error::AuthorizationDenied {
                        tool: name.clone(),
                        role: ctx.principal().role.to_string(),
                    });
                }
                if !tool.is_enabled() {
                    return Err(Error::ToolDisabled(name.clone()));
                }
                debug!(request_id = %ctx.request_id, tool = %name, "Tool call authorized");
                ctx.authorized = Some(tool);
                next.run(ctx).await
            }
            Method::ListTools => match next.run(ctx).await? {
                Response::Tools(tools) => Ok(Response::Tools(
                    self.engine.filter_for_listing(&permissions, tools),
                )),
                other => Ok(other),
            },
            Method::Initialize { .. } | Method::Ping => next.run(ctx).await,
        }
    }
}
