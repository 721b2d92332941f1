//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{info, warn};

use super::auth::admin_token_matches;
use super::dispatcher::{Dispatcher, Reply};
use crate::Error;
use crate::stats::GatewayStats;

/// Shared application state
pub struct AppState {
    /// Request dispatcher (authentication, chain, rendering)
    pub dispatcher: Arc<Dispatcher>,
    /// Request counters
    pub stats: Arc<GatewayStats>,
    /// Admin bearer token; admin routes answer 404 when unset
    pub admin_token: Option<String>,
    /// Prometheus exposition handle
    pub prometheus: Option<MetricsHandle>,
}

/// Handle used to render `/metrics`
#[cfg(feature = "metrics")]
pub type MetricsHandle = metrics_exporter_prometheus::PrometheusHandle;

/// Placeholder when the `metrics` feature is off
#[cfg(not(feature = "metrics"))]
pub type MetricsHandle = ();

/// Create the router
pub fn create_router(state: Arc<AppState>, max_body_size: usize) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/mcp", post(mcp_handler))
        .route("/admin/tools", get(admin_tools_handler))
        .route("/admin/tools/{name}/enabled", post(admin_set_enabled_handler))
        .route("/admin/stats", get(admin_stats_handler));

    #[cfg(feature = "metrics")]
    let router = router.route("/metrics", get(metrics_handler));

    router
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe; touches neither the chain nor the registry
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// POST /mcp - JSON-RPC entry point
async fn mcp_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match state.dispatcher.handle_message(authorization, &body).await {
        Reply::Unauthorized(body) => (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(body),
        )
            .into_response(),
        Reply::Accepted => StatusCode::ACCEPTED.into_response(),
        Reply::Message(body) => Json(body).into_response(),
    }
}

/// Gate for `/admin/*`. `Err` carries the response to send instead.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(StatusCode::NOT_FOUND.into_response());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if admin_token_matches(expected, presented) {
        Ok(())
    } else {
        warn!("Rejected admin request");
        Err((
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response())
    }
}

/// GET /admin/tools - every registered tool, including hidden and disabled ones
async fn admin_tools_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    let tools: Vec<_> = state
        .dispatcher
        .registry()
        .list()
        .iter()
        .map(|t| {
            json!({
                "name": t.name(),
                "enabled": t.is_enabled(),
                "required_roles": t.required_roles(),
            })
        })
        .collect();
    Json(json!({ "tools": tools })).into_response()
}

#[derive(Debug, Deserialize)]
struct EnabledRequest {
    enabled: bool,
}

/// POST /admin/tools/{name}/enabled - runtime toggle
async fn admin_set_enabled_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(request): Json<EnabledRequest>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    match state
        .dispatcher
        .registry()
        .set_enabled(&name, request.enabled)
    {
        Ok(previous) => {
            info!(tool = %name, enabled = request.enabled, previous, "Admin toggled tool");
            Json(json!({ "tool": name, "enabled": request.enabled, "previous": previous }))
                .into_response()
        }
        Err(Error::ToolNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Unknown tool: {name}") })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// GET /admin/stats - request counters
async fn admin_stats_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    Json(state.stats.snapshot()).into_response()
}

/// GET /metrics - Prometheus exposition
#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
