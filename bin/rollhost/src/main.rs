//! rollhost -- host-side sandbox daemon for RL agent rollouts.
//!
//! Boot order matters: logging first, then the working directory is
//! recreated empty, then a cleanup sweep destroys containers orphaned by a
//! previous run, and only then does the HTTP server start accepting
//! requests. On shutdown the sweep runs again after the server drains.

mod cli;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;

use cli::{Cli, RuntimeKind};
use rollhost_agent::{DockerRuntime, MockRuntime, Runtime, TrajectoryManager};
use rollhost_api::{ApiConfig, ApiServer};
use rollhost_core::{init_logging, CoreConfig, LoggingConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logging = LoggingConfig {
        level: cli.log_level.parse().context("invalid --log-level")?,
        format: cli.log_format.parse().context("invalid --log-format")?,
        file: None,
    };
    let _log_guard = init_logging(&logging).context("failed to initialize logging")?;

    let mut core = CoreConfig {
        marker_mode: cli.marker_mode,
        shell_default: cli.shell.clone(),
        ..Default::default()
    };
    if let Some(log_dir) = &cli.log_dir {
        core.log_dir = log_dir.clone();
    }

    // Stale logs from a previous run are useless without their trajectories
    if core.log_dir.exists() {
        std::fs::remove_dir_all(&core.log_dir)
            .with_context(|| format!("failed to clear {}", core.log_dir.display()))?;
    }
    std::fs::create_dir_all(&core.log_dir)
        .with_context(|| format!("failed to create {}", core.log_dir.display()))?;

    let runtime: Arc<dyn Runtime> = match cli.runtime {
        RuntimeKind::Docker => Arc::new(
            DockerRuntime::new()
                .await
                .context("failed to connect to the Docker daemon")?,
        ),
        RuntimeKind::Mock => {
            tracing::warn!("using the mock runtime; no real containers will be created");
            Arc::new(MockRuntime::new())
        }
    };

    let manager = Arc::new(TrajectoryManager::new(core, runtime));

    manager
        .cleanup_all()
        .await
        .context("startup cleanup sweep failed")?;

    let api_config = ApiConfig {
        bind: cli.bind,
        swagger_enabled: !cli.no_swagger,
        ..Default::default()
    };

    let server = ApiServer::new(api_config);
    let sweeper = manager.clone();

    server
        .run_with_shutdown(manager, async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    if let Err(e) = sweeper.cleanup_all().await {
        tracing::warn!(error = %e, "cleanup sweep failed during shutdown");
    }

    Ok(())
}
