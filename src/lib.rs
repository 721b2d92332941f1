//! MCP RBAC Gateway Library
//!
//! A Model Context Protocol (MCP) server that gates tool visibility and
//! invocation on the caller's role.
//!
//! # Features
//!
//! - **Role hierarchy**: roles inherit the permissions of the roles they subsume
//! - **Existence hiding**: tools a caller may not use are absent from `tools/list`
//!   and indistinguishable from unknown tools on `tools/call`
//! - **Ordered middleware**: timing, audit, rate limiting, role resolution and
//!   authorization run as a validated onion chain around the tool executor
//! - **Runtime toggles**: tools can be disabled and re-enabled through the admin API
//! - **Production Ready**: health checks, metrics, structured audit log, graceful shutdown
//!
//! # Protocol Version
//!
//! Speaks MCP over JSON-RPC 2.0 on Streamable HTTP (`POST /mcp`), protocol
//! versions 2024-11-05 through 2025-06-18.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod protocol;
pub mod rbac;
pub mod registry;
pub mod stats;
pub mod tools;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// # Errors
///
/// Returns `Error::Config` if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}
