//! Gateway server

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use super::auth::{Authenticator, StaticCredentialStore};
use super::dispatcher::{DispatchOptions, Dispatcher};
use super::executor::ToolExecutor;
use super::router::{AppState, MetricsHandle, create_router};
use crate::config::{Config, MiddlewareKind, ToolsConfig};
use crate::middleware::{
    AuditMiddleware, AuditSink, AuthorizationMiddleware, Chain, ChainBuilder, Middleware,
    RateLimitMiddleware, RoleResolver, TimingMiddleware, TracingAuditSink,
};
use crate::rbac::AuthorizationEngine;
use crate::registry::ToolRegistry;
use crate::stats::GatewayStats;
use crate::tools;
use crate::{Error, Result};

/// RBAC gateway server
pub struct Gateway {
    config: Config,
    engine: Arc<AuthorizationEngine>,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<GatewayStats>,
}

impl Gateway {
    /// Build a gateway with the configured toolsets and a tracing audit sink
    pub fn new(config: Config) -> Result<Self> {
        let registry = build_registry(&config.tools)?;
        Self::with_registry(config, registry, Arc::new(TracingAuditSink))
    }

    /// Build a gateway around an existing registry and audit sink
    pub fn with_registry(
        config: Config,
        registry: ToolRegistry,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        let engine = Arc::new(AuthorizationEngine::new(config.role_hierarchy()?));
        let registry = Arc::new(registry);
        let stats = Arc::new(GatewayStats::new());

        let chain = build_chain(
            &config.gateway.middleware,
            &engine,
            &registry,
            &stats,
            &audit,
            &config.tools,
        )?;

        let store = StaticCredentialStore::from_config(&config.auth);
        if store.is_empty() {
            warn!("No users configured - every MCP request will be rejected");
        }
        let authenticator = Authenticator::new(Arc::new(store));

        let options = DispatchOptions {
            request_timeout: config.server.request_timeout,
            mask_error_details: config.tools.mask_error_details,
        };
        let dispatcher = Arc::new(Dispatcher::new(
            authenticator,
            chain,
            registry,
            audit,
            options,
        ));

        Ok(Self {
            config,
            engine,
            dispatcher,
            stats,
        })
    }

    /// Request dispatcher
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Request counters
    #[must_use]
    pub fn stats(&self) -> &Arc<GatewayStats> {
        &self.stats
    }

    /// Tools each known role would see in `tools/list`, roles sorted
    #[must_use]
    pub fn visibility(&self) -> Vec<(String, Vec<String>)> {
        let tools = self.dispatcher.registry().list();
        let hierarchy = self.engine.hierarchy();
        hierarchy
            .roles()
            .into_iter()
            .map(|role| {
                let permissions = hierarchy.permissions(role).cloned().unwrap_or_default();
                let visible = self
                    .engine
                    .filter_for_listing(&permissions, tools.clone())
                    .iter()
                    .map(|t| t.name().to_string())
                    .collect();
                (role.to_string(), visible)
            })
            .collect()
    }

    /// HTTP router without a metrics exporter
    #[must_use]
    pub fn router(&self) -> Router {
        self.build_router(None)
    }

    fn build_router(&self, prometheus: Option<MetricsHandle>) -> Router {
        let admin_token = self.config.admin.resolve_token();
        if let (Some("auto"), Some(token)) = (self.config.admin.token.as_deref(), &admin_token) {
            info!("Generated admin token: {token}");
        }
        let state = Arc::new(AppState {
            dispatcher: Arc::clone(&self.dispatcher),
            stats: Arc::clone(&self.stats),
            admin_token,
            prometheus,
        });
        create_router(state, self.config.server.max_body_size)
    }

    /// Serve until SIGINT/SIGTERM, then drain for at most `shutdown_timeout`
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let app = self.build_router(install_metrics_recorder());
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("MCP RBAC GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(
            tools = self.dispatcher.registry().len(),
            users = self.config.auth.users.len(),
            "Registry ready"
        );
        info!(chain = ?self.dispatcher.chain().units(), "Middleware chain");
        if self.config.admin.token.is_none() {
            info!("Admin API disabled (no admin.token)");
        }
        info!("============================================================");

        let shutdown = Arc::new(Notify::new());
        let signalled = Arc::clone(&shutdown);
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                signalled.notify_one();
            })
            .into_future();

        let drain_timeout = self.config.server.shutdown_timeout;
        tokio::select! {
            result = serve => result.map_err(|e| Error::Internal(e.to_string()))?,
            () = async {
                shutdown.notified().await;
                tokio::time::sleep(drain_timeout).await;
            } => {
                warn!(timeout = ?drain_timeout, "Drain timed out, dropping in-flight requests");
            }
        }

        info!("Gateway stopped");
        Ok(())
    }
}

/// Install the global Prometheus recorder. Only one can exist per process.
#[cfg(feature = "metrics")]
fn install_metrics_recorder() -> Option<MetricsHandle> {
    match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed, /metrics disabled");
            None
        }
    }
}

#[cfg(not(feature = "metrics"))]
fn install_metrics_recorder() -> Option<MetricsHandle> {
    None
}

/// Assemble the configured toolsets, applying role overrides and the
/// initial disabled list.
///
/// # Errors
///
/// Returns `Error::Config` for an unknown toolset, or for an override or
/// disabled entry that names no registered tool; `Error::DuplicateTool` if
/// two toolsets define the same name.
pub fn build_registry(config: &ToolsConfig) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for name in &config.toolsets {
        for mut descriptor in tools::toolset(name)? {
            if let Some(roles) = config.role_overrides.get(descriptor.name()) {
                descriptor = descriptor.with_roles(roles.iter().map(String::as_str));
            }
            if config.disabled.iter().any(|d| d == descriptor.name()) {
                descriptor = descriptor.with_enabled(false);
            }
            registry.register(descriptor)?;
        }
    }

    let unknown = config
        .disabled
        .iter()
        .chain(config.role_overrides.keys())
        .find(|name| registry.get(name).is_err());
    if let Some(name) = unknown {
        return Err(Error::Config(format!(
            "Tool '{name}' is configured but no enabled toolset provides it"
        )));
    }

    info!(tools = registry.len(), toolsets = ?config.toolsets, "Tool registry built");
    Ok(registry)
}

/// Fold the configured middleware kinds around the tool executor
pub fn build_chain(
    kinds: &[MiddlewareKind],
    engine: &Arc<AuthorizationEngine>,
    registry: &Arc<ToolRegistry>,
    stats: &Arc<GatewayStats>,
    audit: &Arc<dyn AuditSink>,
    tools: &ToolsConfig,
) -> Result<Chain> {
    let mut builder = ChainBuilder::new();
    for kind in kinds {
        let unit: Arc<dyn Middleware> = match kind {
            MiddlewareKind::Timing => Arc::new(TimingMiddleware::new(Arc::clone(stats))),
            MiddlewareKind::Audit => Arc::new(AuditMiddleware::new(Arc::clone(audit))),
            MiddlewareKind::RateLimit => Arc::new(RateLimitMiddleware::new()),
            MiddlewareKind::Roles => Arc::new(RoleResolver::new(Arc::clone(engine))),
            MiddlewareKind::Authorization => Arc::new(AuthorizationMiddleware::new(
                Arc::clone(engine),
                Arc::clone(registry),
            )),
        };
        builder = builder.with(unit);
    }
    let executor = Arc::new(ToolExecutor::new(
        Arc::clone(registry),
        tools.unknown_arguments,
    ));
    builder.build(executor)
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
