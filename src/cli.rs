//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Role-based MCP tool gateway
#[derive(Parser, Debug)]
#[command(name = "mcp-rbac-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "RBAC_GATEWAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "RBAC_GATEWAY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "RBAC_GATEWAY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "RBAC_GATEWAY_PORT")]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long, env = "RBAC_GATEWAY_HOST")]
        host: Option<String>,
    },

    /// Validate the configuration and print who can see which tool
    Check,
}
