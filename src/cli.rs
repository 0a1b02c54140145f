//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Mutually-authenticated API server with live trust and cipher configuration
#[derive(Parser, Debug)]
#[command(name = "cdi-apiserver")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "CDI_APISERVER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "CDI_APISERVER_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "CDI_APISERVER_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "CDI_APISERVER_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "CDI_APISERVER_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the API server (default)
    Serve,

    /// Read the watched resources once and print what would be served
    Check {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}
