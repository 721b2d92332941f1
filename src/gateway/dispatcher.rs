//! Request dispatcher
//!
//! Owns the per-request lifecycle: authenticate, build the context, run the
//! chain on its own task, render the outcome as JSON-RPC.
//!
//! ```text
//! Received ─▶ Authenticated ─▶ chain ─▶ Responded
//!     └──(bad credential)──────────────▶ Rejected (401)
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, warn};

use super::auth::{Authenticator, Principal};
use super::trace;
use crate::error::rpc_codes;
use crate::middleware::{AuditEvent, AuditSink, Chain, Method, RequestContext, Response};
use crate::protocol::{
    JsonRpcResponse, RequestId, Tool, ToolsCallResult, ToolsListResult, decode_method,
    parse_request,
};
use crate::registry::ToolRegistry;
use crate::{Error, Result};

/// What the transport should send back
#[derive(Debug)]
pub enum Reply {
    /// Credential rejected; send 401 with this body
    Unauthorized(JsonRpcResponse),
    /// Notification accepted; send 202 with no body
    Accepted,
    /// JSON-RPC response
    Message(JsonRpcResponse),
}

/// Dispatcher settings taken from configuration
#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    /// Upper bound on one request's time in the chain
    pub request_timeout: Duration,
    /// Hide handler error text from clients
    pub mask_error_details: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            mask_error_details: true,
        }
    }
}

/// Entry point for every MCP request
pub struct Dispatcher {
    authenticator: Authenticator,
    chain: Arc<Chain>,
    registry: Arc<ToolRegistry>,
    audit: Arc<dyn AuditSink>,
    options: DispatchOptions,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(
        authenticator: Authenticator,
        chain: Chain,
        registry: Arc<ToolRegistry>,
        audit: Arc<dyn AuditSink>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            authenticator,
            chain: Arc::new(chain),
            registry,
            audit,
            options,
        }
    }

    /// The registry the chain serves
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// The assembled chain
    #[must_use]
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Resolve a credential. Failures are audited here since they never
    /// reach the chain.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Principal> {
        self.authenticator.resolve(authorization).inspect_err(|e| {
            self.audit
                .record(&AuditEvent::unauthenticated(trace::generate(), e.to_string()));
        })
    }

    /// Authenticate and run one decoded request
    pub async fn handle(&self, authorization: Option<&str>, method: Method) -> Result<Response> {
        let principal = self.authenticate(authorization)?;
        self.dispatch(principal, method).await
    }

    /// Run one request for an authenticated principal.
    ///
    /// The chain runs on its own task. If this future is dropped (caller
    /// gone) or the timeout fires, the request's cancellation token is
    /// cancelled; the task may still finish, and its result is discarded.
    pub async fn dispatch(&self, principal: Principal, method: Method) -> Result<Response> {
        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();
        let mut ctx = RequestContext::new(method, principal, cancel.clone());
        let request_id = ctx.request_id.clone();
        let span = info_span!(
            "request",
            request_id = %request_id,
            method = ctx.method.as_str(),
            principal = %ctx.principal().id,
        );

        let chain = Arc::clone(&self.chain);
        let task = tokio::spawn(
            trace::with_request_id(request_id.clone(), async move {
                chain.execute(&mut ctx).await
            })
            .instrument(span),
        );

        let result = match tokio::time::timeout(self.options.request_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(request_id = %request_id, error = %e, "Request task failed");
                Err(Error::MiddlewareFailure("dispatcher".to_string()))
            }
            Err(_) => {
                warn!(
                    request_id = %request_id,
                    timeout = ?self.options.request_timeout,
                    "Request timed out"
                );
                cancel.cancel();
                Err(Error::Timeout(self.options.request_timeout))
            }
        };
        let _ = guard.disarm();
        result
    }

    /// Full JSON-RPC handling of one HTTP body
    pub async fn handle_message(&self, authorization: Option<&str>, body: &[u8]) -> Reply {
        let principal = match self.authenticate(authorization) {
            Ok(p) => p,
            Err(e) => {
                let (code, message) = e.to_rpc_error();
                return Reply::Unauthorized(JsonRpcResponse::error(None, code, message));
            }
        };

        let request = match parse_request(body) {
            Ok(r) => r,
            Err(e) => return Reply::Message(JsonRpcResponse::error(None, e.code, e.message)),
        };

        if request.is_notification() {
            debug!(method = %request.method, "Notification accepted");
            return Reply::Accepted;
        }

        let method = match decode_method(&request.method, request.params.as_ref()) {
            Ok(m) => m,
            Err(e) => return Reply::Message(JsonRpcResponse::error(request.id, e.code, e.message)),
        };

        let result = self.dispatch(principal, method).await;
        Reply::Message(self.render(request.id, result))
    }

    /// Encode a chain outcome as a JSON-RPC response
    #[must_use]
    pub fn render(&self, id: Option<RequestId>, result: Result<Response>) -> JsonRpcResponse {
        match result {
            Ok(Response::Initialized(value)) => JsonRpcResponse::success(id, value),
            Ok(Response::Pong) => JsonRpcResponse::success(id, json!({})),
            Ok(Response::Tools(tools)) => encode(
                id,
                &ToolsListResult {
                    tools: tools.iter().map(|t| Tool::from(t.as_ref())).collect(),
                },
            ),
            Ok(Response::ToolResult(value)) => encode(id, &ToolsCallResult::from_value(value)),
            Err(Error::ToolExecution { tool, message }) => {
                let text = if self.options.mask_error_details {
                    format!("Error calling tool '{tool}'")
                } else {
                    format!("Error calling tool '{tool}': {message}")
                };
                encode(id, &ToolsCallResult::error(text))
            }
            Err(e) => {
                let (code, message) = e.to_rpc_error();
                JsonRpcResponse::error(id, code, message)
            }
        }
    }
}

fn encode<T: Serialize>(id: Option<RequestId>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => {
            error!(error = %e, "Failed to encode result");
            JsonRpcResponse::error(id, rpc_codes::INTERNAL_ERROR, "Internal error")
        }
    }
}
