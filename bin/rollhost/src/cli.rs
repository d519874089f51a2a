//! CLI argument definitions for the `rollhost` daemon

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Host-side sandbox daemon for RL agent rollouts
#[derive(Parser, Debug)]
#[command(
    name = "rollhost",
    version,
    about = "Brokers container-backed shell sessions for RL agent rollouts"
)]
pub struct Cli {
    /// Address the HTTP API binds to
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Directory for per-trajectory output logs (recreated empty on boot)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Wrap interactive commands with a completion marker
    #[arg(long)]
    pub marker_mode: bool,

    /// Default shell launched in sandbox containers
    #[arg(long, default_value = "/bin/bash")]
    pub shell: String,

    /// Container runtime backend
    #[arg(long, value_enum, default_value_t = RuntimeKind::Docker)]
    pub runtime: RuntimeKind,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log format (pretty, json, compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Disable the Swagger UI
    #[arg(long)]
    pub no_swagger: bool,
}

/// Selectable container runtime backends
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeKind {
    /// Docker daemon over the local socket
    Docker,
    /// In-memory mock, for development without a container runtime
    Mock,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["rollhost"]);
        assert_eq!(cli.bind, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cli.runtime, RuntimeKind::Docker);
        assert!(!cli.marker_mode);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::parse_from([
            "rollhost",
            "--bind",
            "127.0.0.1:9000",
            "--marker-mode",
            "--runtime",
            "mock",
        ]);
        assert_eq!(cli.bind, "127.0.0.1:9000".parse().unwrap());
        assert!(cli.marker_mode);
        assert_eq!(cli.runtime, RuntimeKind::Mock);
    }
}
