//! Request middleware chain.
//!
//! Every request runs through an ordered list of [`Middleware`] units that
//! were folded into one continuation at startup (see [`ChainBuilder`]).
//! Units run in registration order on the way in and in reverse order on
//! the way out:
//!
//! ```text
//! timing ─▶ audit ─▶ rate_limit ─▶ roles ─▶ authorization ─▶ executor
//!   ◀────────◀──────────◀────────────◀──────────◀─────────────┘
//! ```
//!
//! A unit may answer without calling [`Next::run`] (short-circuit), or call
//! it once and post-process the result. [`Next::run`] takes `self`, so a
//! second call does not compile.
//!
//! # Ordering
//!
//! Units declare the [`Fact`]s they need on the [`RequestContext`] and the
//! facts they establish. [`ChainBuilder::build`] rejects any order in which
//! a unit (or the terminal endpoint) needs a fact that nothing before it
//! provides.

mod audit;
mod authorization;
mod chain;
mod rate_limit;
mod roles;
mod timing;

pub use audit::{AuditEvent, AuditMiddleware, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use authorization::AuthorizationMiddleware;
pub use chain::{Chain, ChainBuilder};
pub use rate_limit::RateLimitMiddleware;
pub use roles::RoleResolver;
pub use timing::TimingMiddleware;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::gateway::auth::Principal;
use crate::gateway::trace;
use crate::rbac::PermissionSet;
use crate::registry::ToolDescriptor;

/// Context facts a unit can depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fact {
    /// An authenticated principal (always present; set by the dispatcher)
    Principal,
    /// The principal's expanded permission set
    Permissions,
    /// An authorization decision for the requested operation
    Authorization,
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Principal => "principal",
            Self::Permissions => "permissions",
            Self::Authorization => "authorization",
        })
    }
}

/// Decoded protocol method
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    /// `initialize` handshake
    Initialize {
        /// Protocol version the client asked for
        protocol_version: Option<String>,
    },
    /// `ping`
    Ping,
    /// `tools/list`
    ListTools,
    /// `tools/call`
    CallTool {
        /// Tool name
        name: String,
        /// Raw arguments
        arguments: Map<String, Value>,
    },
}

impl Method {
    /// Protocol method name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::Ping => "ping",
            Self::ListTools => "tools/list",
            Self::CallTool { .. } => "tools/call",
        }
    }

    /// Tool name for `tools/call`
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::CallTool { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Successful outcome of a request
#[derive(Debug, Clone)]
pub enum Response {
    /// `initialize` result payload
    Initialized(Value),
    /// `ping` reply
    Pong,
    /// Tools visible to the caller, in registration order
    Tools(Vec<Arc<ToolDescriptor>>),
    /// Value returned by a tool handler
    ToolResult(Value),
}

/// Per-request state passed through the chain. Never shared across requests.
#[derive(Debug)]
pub struct RequestContext {
    /// Gateway request id (`gw-<uuid>`)
    pub request_id: String,
    /// Requested operation
    pub method: Method,
    principal: Principal,
    /// Expanded permissions, once a unit has resolved them
    pub permissions: Option<PermissionSet>,
    /// Descriptor the authorization unit admitted for `tools/call`
    pub authorized: Option<Arc<ToolDescriptor>>,
    /// Free-form values for unit-to-unit communication
    pub state: HashMap<String, Value>,
    /// Monotonic start of the request
    pub started: Instant,
    /// Wall-clock receive time, for logs and audit only
    pub received_at: DateTime<Utc>,
    /// Cancelled when the caller disconnects
    pub cancel: CancellationToken,
}

impl RequestContext {
    /// Create a context for an authenticated request
    #[must_use]
    pub fn new(method: Method, principal: Principal, cancel: CancellationToken) -> Self {
        Self {
            request_id: trace::generate(),
            method,
            principal,
            permissions: None,
            authorized: None,
            state: HashMap::new(),
            started: Instant::now(),
            received_at: Utc::now(),
            cancel,
        }
    }

    /// The authenticated caller
    #[must_use]
    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}

/// Something that can answer a request: a chain link or the terminal
/// handler.
#[async_trait]
pub trait Endpoint: Send + Sync + 'static {
    /// Handle the request
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Response>;

    /// Facts that must be established before this endpoint runs
    fn requires(&self) -> &'static [Fact] {
        &[]
    }
}

/// Continuation to the rest of the chain. Usable at most once.
pub struct Next<'a> {
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub(crate) fn new(endpoint: &'a dyn Endpoint) -> Self {
        Self { endpoint }
    }

    /// Run the remaining chain
    pub async fn run(self, ctx: &mut RequestContext) -> Result<Response> {
        self.endpoint.handle(ctx).await
    }
}

/// A cross-cutting interceptor.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Unit name for logs and configuration errors
    fn name(&self) -> &'static str;

    /// Facts this unit reads
    fn requires(&self) -> &'static [Fact] {
        &[]
    }

    /// Facts this unit establishes for later units
    fn provides(&self) -> &'static [Fact] {
        &[]
    }

    /// Intercept a request. Call `next.run(ctx)` to continue, or return
    /// without calling it to short-circuit.
    async fn intercept(&self, ctx: &mut RequestContext, next: Next<'_>) -> Result<Response>;
}
