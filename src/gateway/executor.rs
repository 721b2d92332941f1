//! Terminal request handler

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::middleware::{Endpoint, Fact, Method, RequestContext, Response};
use crate::protocol::{
    Info, InitializeResult, ServerCapabilities, ToolsCapability, negotiate_version,
};
use crate::registry::{ArgumentPolicy, ToolInvocation, ToolRegistry};
use crate::{Error, Result};

const INSTRUCTIONS: &str = "Role-based tool gateway. `tools/list` shows only the tools your \
                            credential may call.";

/// Innermost endpoint: answers protocol methods and invokes tool handlers.
///
/// `tools/call` runs only with an authorization record on the context, and
/// only for the tool that record names.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    argument_policy: ArgumentPolicy,
}

impl ToolExecutor {
    /// Create the executor
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, argument_policy: ArgumentPolicy) -> Self {
        Self {
            registry,
            argument_policy,
        }
    }

    fn initialize(requested: Option<&str>) -> Result<Response> {
        let result = InitializeResult {
            protocol_version: negotiate_version(requested).to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
            },
            server_info: Info {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        };
        Ok(Response::Initialized(serde_json::to_value(result)?))
    }
}

#[async_trait]
impl Endpoint for ToolExecutor {
    fn requires(&self) -> &'static [Fact] {
        &[Fact::Authorization]
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Result<Response> {
        match &ctx.method {
            Method::Initialize { protocol_version } => Self::initialize(protocol_version.as_deref()),
            Method::Ping => Ok(Response::Pong),
            Method::ListTools => Ok(Response::Tools(
                self.registry
                    .list()
                    .into_iter()
                    .filter(|t| t.is_enabled())
                    .collect(),
            )),
            Method::CallTool { name, arguments } => {
                let Some(tool) = ctx.authorized.clone().filter(|t| t.name() == name.as_str()) else {
                    warn!(request_id = %ctx.request_id, tool = %name, "Call reached executor without authorization");
                    return Err(Error::AuthorizationDenied {
                        tool: name.clone(),
                        role: ctx.principal().role.to_string(),
                    });
                };

                let arguments = tool.check_arguments(arguments.clone(), self.argument_policy)?;
                let invocation = ToolInvocation {
                    tool: name.clone(),
                    arguments,
                    principal: ctx.principal().clone(),
                    cancel: ctx.cancel.clone(),
                };

                debug!(request_id = %ctx.request_id, tool = %name, "Invoking tool");
                tool.handler()
                    .call(invocation)
                    .await
                    .map(Response::ToolResult)
                    .map_err(|e| Error::tool_execution(name.clone(), e))
            }
        }
    }
}
