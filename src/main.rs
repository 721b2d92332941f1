//! MCP RBAC Gateway - role-based tool visibility and call gating for MCP

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use mcp_rbac_gateway::{
    cli::{Cli, Command},
    config::Config,
    gateway::Gateway,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Check) => run_check(&cli),
        Some(Command::Serve { port, ref host }) => run_server(&cli, port, host.clone()).await,
        None => run_server(&cli, None, None).await,
    }
}

/// Validate configuration, build the chain, and print the visibility matrix
fn run_check(cli: &Cli) -> ExitCode {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };
    let users = config.auth.users.len();
    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("✅ Configuration is valid");
    println!("   Users: {users}");
    println!("   Tools: {}", gateway.dispatcher().registry().len());
    println!(
        "   Middleware: {}",
        gateway.dispatcher().chain().units().join(" → ")
    );
    println!("\nVisible tools per role:");
    for (role, tools) in gateway.visibility() {
        if tools.is_empty() {
            println!("  {role}: (none)");
        } else {
            println!("  {role}: {}", tools.join(", "));
        }
    }
    ExitCode::SUCCESS
}

async fn run_server(cli: &Cli, port: Option<u16>, host: Option<String>) -> ExitCode {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        users = config.auth.users.len(),
        toolsets = ?config.tools.toolsets,
        "Starting MCP RBAC Gateway"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}
