//! CDI API server - mTLS with live client-CA and TLS profile configuration

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use cdi_apiserver_tls::{
    cli::{Cli, Command},
    config::Config,
    server::{self, ApiServer},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Check { format }) => run_check(&config, &format).await,
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Print the resolved configuration once
async fn run_check(config: &Config, format: &str) -> ExitCode {
    let report = match server::check(config).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Check failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    if format == "json" {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to serialize to JSON: {e}");
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    println!("Client CA pool:   {} trust anchor(s)", report.trust_anchors);
    if report.allowed_names.is_empty() {
        println!("Allowed names:    <any>");
    } else {
        println!("Allowed names:    {}", report.allowed_names.join(", "));
    }
    println!("User headers:     {}", report.user_headers.join(", "));
    println!("Group headers:    {}", report.group_headers.join(", "));
    println!("Extra prefixes:   {}", report.extra_prefix_headers.join(", "));
    println!("TLS profile:      {}", report.tls_profile);
    println!("Min TLS version:  {}", report.min_tls_version);
    println!("Cipher suites:");
    for suite in &report.cipher_suites {
        println!("  {suite}");
    }
    ExitCode::SUCCESS
}

/// Run the API server
async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "Starting CDI API server"
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let server = match ApiServer::start(config, &shutdown_tx).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start API server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run(shutdown_tx).await {
        error!("API server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("API server shutdown complete");
    ExitCode::SUCCESS
}
