//! Daemon-wide configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Dimensions of the virtual screen used when replaying captured terminal
/// output. Large enough to hold a full command transcript; content that
/// scrolls off the top is lost.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScreenSize {
    /// Screen width in columns
    #[serde(default = "default_cols")]
    pub cols: u16,
    /// Screen height in rows
    #[serde(default = "default_rows")]
    pub rows: u16,
}

fn default_cols() -> u16 {
    300
}

fn default_rows() -> u16 {
    1000
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self {
            cols: default_cols(),
            rows: default_rows(),
        }
    }
}

/// Core daemon configuration.
///
/// Constructed once at startup and threaded into the trajectory manager by
/// value; components read it by reference. Never mutated after init.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Wrap interactive commands with a completion marker so that callers
    /// can detect command completion in the output transcript. When off,
    /// callers rely on the per-command timeout and poll until satisfied.
    #[serde(default)]
    pub marker_mode: bool,

    /// Virtual screen used for terminal replay
    #[serde(default)]
    pub screen: ScreenSize,

    /// Directory holding per-trajectory output logs. Recreated empty on
    /// daemon boot.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Shell launched in sandbox containers when the request does not
    /// supply one
    #[serde(default = "default_shell")]
    pub shell_default: String,

    /// Value of the `managed-by` label stamped on every container this
    /// daemon creates. Cleanup sweeps filter on it.
    #[serde(default = "default_managed_by")]
    pub managed_by: String,

    /// Grace period given to a container before force removal
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: Duration,

    /// Deadline for the whole pull/create/start/attach sequence
    #[serde(default = "default_start_deadline")]
    pub start_deadline: Duration,

    /// Deadline for stopping and removing a single trajectory
    #[serde(default = "default_shutdown_deadline")]
    pub shutdown_deadline: Duration,
}

fn default_log_dir() -> PathBuf {
    std::env::temp_dir().join("rollhost")
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

fn default_managed_by() -> String {
    "rollhost".to_string()
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_start_deadline() -> Duration {
    Duration::from_secs(300)
}

fn default_shutdown_deadline() -> Duration {
    Duration::from_secs(30)
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            marker_mode: false,
            screen: ScreenSize::default(),
            log_dir: default_log_dir(),
            shell_default: default_shell(),
            managed_by: default_managed_by(),
            stop_timeout: default_stop_timeout(),
            start_deadline: default_start_deadline(),
            shutdown_deadline: default_shutdown_deadline(),
        }
    }
}
