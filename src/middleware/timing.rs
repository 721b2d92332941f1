//! Request timing and counters.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{Middleware, Next, RequestContext, Response};
use crate::Result;
use crate::stats::GatewayStats;

/// Measures the time spent in the rest of the chain.
///
/// Stores `elapsed_ms` in the context state, feeds [`GatewayStats`] and
/// emits `gateway_requests_total` / `gateway_request_duration_seconds`.
pub struct TimingMiddleware {
    stats: Arc<GatewayStats>,
}

impl TimingMiddleware {
    /// Create the unit
    #[must_use]
    pub fn new(stats: Arc<GatewayStats>) -> Self {
        Self { stats }
    }
}

#[async_trait]
impl Middleware for TimingMiddleware {
    fn name(&self) -> &'static str {
        "timing"
    }

    async fn intercept(&self, ctx: &mut RequestContext, next: Next<'_>) -> Result<Response> {
        let started = std::time::Instant::now();
        let result = next.run(ctx).await;
        let elapsed = started.elapsed();

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.outcome(),
        };
        let method = ctx.method.as_str();
        let tool = ctx.method.tool_name().map(str::to_string);

        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = elapsed.as_millis() as u64;
        ctx.state.insert("elapsed_ms".to_string(), json!(elapsed_ms));

        self.stats.record(tool.as_deref(), outcome);
        telemetry_metrics::counter!(
            "gateway_requests_total",
            "method" => method,
            "outcome" => outcome
        )
        .increment(1);
        telemetry_metrics::histogram!("gateway_request_duration_seconds", "method" => method)
            .record(elapsed.as_secs_f64());

        debug!(
            request_id = %ctx.request_id,
            method,
            tool = tool.as_deref().unwrap_or("-"),
            outcome,
            elapsed_ms,
            "Request timed"
        );
        result
    }
}
