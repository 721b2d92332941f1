//! Audit trail for gateway requests.
//!
//! One event per request that reaches the chain, plus one per rejected
//! credential (emitted by the dispatcher). Events carry the real outcome,
//! so a denial and a missing tool are distinguishable here even though the
//! client sees the same error.
//!
//! | Event | When |
//! |-------|------|
//! | `request.completed` | The chain returned a response |
//! | `request.failed` | The chain returned an error |
//! | `request.unauthenticated` | The credential was missing or unknown |

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use super::{Middleware, Next, RequestContext, Response};
use crate::Result;

/// Structured audit record
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Event type (`request.completed`, ...)
    pub event: &'static str,
    /// Gateway request id
    pub request_id: String,
    /// RFC 3339 receive time
    pub timestamp: String,
    /// Principal id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    /// Principal's primary role
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Protocol method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<&'static str>,
    /// Requested tool, for `tools/call`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Outcome label (`ok`, `denied`, `not_found`, ...)
    pub outcome: &'static str,
    /// Time spent in the inner chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    /// Internal error detail. Never sent to clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    /// Event for a request that went through the chain
    #[must_use]
    pub fn for_request(ctx: &RequestContext, result: &Result<Response>) -> Self {
        let (event, outcome, reason) = match result {
            Ok(_) => ("request.completed", "ok", None),
            Err(e) => ("request.failed", e.outcome(), Some(e.to_string())),
        };
        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = ctx.started.elapsed().as_millis() as u64;
        Self {
            event,
            request_id: ctx.request_id.clone(),
            timestamp: ctx.received_at.to_rfc3339(),
            principal: Some(ctx.principal().id.clone()),
            role: Some(ctx.principal().role.to_string()),
            method: Some(ctx.method.as_str()),
            tool: ctx.method.tool_name().map(str::to_string),
            outcome,
            elapsed_ms: Some(elapsed_ms),
            reason,
        }
    }

    /// Event for a rejected credential
    #[must_use]
    pub fn unauthenticated(request_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            event: "request.unauthenticated",
            request_id: request_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            principal: None,
            role: None,
            method: None,
            tool: None,
            outcome: "unauthenticated",
            elapsed_ms: None,
            reason: Some(reason.into()),
        }
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync + 'static {
    /// Record one event
    fn record(&self, event: &AuditEvent);
}

/// Emits each event as a JSON blob in the `audit` field of an INFO record:
///
/// ```text
/// INFO mcp_rbac_gateway::middleware::audit audit={"event":"request.failed",...}
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        match serde_json::to_string(event) {
            Ok(ref json) => tracing::info!(audit = %json, "gateway audit"),
            Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
        }
    }
}

/// Keeps events in memory. Useful for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the events recorded so far
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Records an [`AuditEvent`] after the inner chain completes.
pub struct AuditMiddleware {
    sink: Arc<dyn AuditSink>,
}

impl AuditMiddleware {
    /// Create the unit
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Middleware for AuditMiddleware {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn intercept(&self, ctx: &mut RequestContext, next: Next<'_>) -> Result<Response> {
        let result = next.run(ctx).await;
        self.sink.record(&AuditEvent::for_request(ctx, &result));
        result
    }
}
