//! Trajectory lifecycle management
//!
//! A trajectory is one named, long-lived sandbox session: one container,
//! one attached shell, one output log. The manager owns the trajectory
//! table and the shared runtime client and routes every request through a
//! per-trajectory critical section, so commands against the same trajectory
//! are totally ordered while distinct trajectories proceed in parallel.

use crate::error::{AgentError, Result};
use crate::output::OutputStore;
use crate::runtime::{ExecOptions, Runtime, SandboxSpec};
use crate::shell::ShellSession;
use rollhost_core::model::{RunCommandInput, StartSandboxInput};
use rollhost_core::CoreConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Label carrying the trajectory id on every managed container
pub const TRAJECTORY_LABEL: &str = "trajectory";

/// Label used by cleanup sweeps to find containers this daemon owns
pub const MANAGED_BY_LABEL: &str = "managed-by";

/// Result of a run_command call
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Cleaned output (interactive) or combined stdout+stderr (exec)
    pub output: String,
    /// Exit code reported by the runtime; only non-interactive execs have one
    pub exit_code: Option<i64>,
    /// The completion marker was observed (interactive, marker mode only) or
    /// the exec ran to completion
    pub finished: bool,
    /// A non-interactive exec hit its deadline
    pub timed_out: bool,
}

/// One live sandbox session
struct Trajectory {
    container_id: String,
    shell: ShellSession,
    output: OutputStore,
    /// Offset into the cleaned transcript already returned to the caller
    watermark: usize,
    /// Shell the container was created with; reused for exec resolution
    shell_path: String,
}

/// Owns the trajectory table and coordinates create/run/read/shutdown
/// against the container runtime.
pub struct TrajectoryManager {
    config: CoreConfig,
    runtime: Arc<dyn Runtime>,
    trajectories: RwLock<HashMap<String, Arc<Mutex<Trajectory>>>>,
}

impl TrajectoryManager {
    pub fn new(config: CoreConfig, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            config,
            runtime,
            trajectories: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Whether a live trajectory with this id exists
    pub async fn contains(&self, trajectory_id: &str) -> bool {
        self.trajectories.read().await.contains_key(trajectory_id)
    }

    /// Number of live trajectories
    pub async fn trajectory_count(&self) -> usize {
        self.trajectories.read().await.len()
    }

    /// Create and attach a new sandbox for `trajectory_id`.
    ///
    /// Pulls the image if missing, creates and starts the container, attaches
    /// the TTY, and spawns the capture pump. A start on an id that is already
    /// live is rejected rather than silently reused. A failed start leaves no
    /// trajectory entry, so the caller may retry with the same id.
    #[instrument(skip(self, input), fields(trajectory = %trajectory_id, image = %input.image_id))]
    pub async fn start_sandbox(
        &self,
        trajectory_id: &str,
        input: &StartSandboxInput,
    ) -> Result<()> {
        if self.contains(trajectory_id).await {
            return Err(AgentError::TrajectoryExists(trajectory_id.to_string()));
        }

        let spec = self.build_spec(trajectory_id, input);
        let trajectory =
            match tokio::time::timeout(self.config.start_deadline, self.create_trajectory(spec))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    // The half-created container is picked up here or by the
                    // next cleanup sweep
                    let _ = self.runtime.remove_container(trajectory_id).await;
                    return Err(AgentError::Deadline(format!(
                        "start_sandbox exceeded {:?}",
                        self.config.start_deadline
                    )));
                }
            };

        self.trajectories
            .write()
            .await
            .insert(trajectory_id.to_string(), Arc::new(Mutex::new(trajectory)));

        info!(trajectory = %trajectory_id, "sandbox started");
        Ok(())
    }

    async fn create_trajectory(&self, spec: SandboxSpec) -> Result<Trajectory> {
        self.runtime.pull_image(&spec.image).await?;

        let container_id = self.runtime.create_container(&spec).await?;

        if let Err(e) = self.runtime.start_container(&container_id).await {
            let _ = self.runtime.remove_container(&container_id).await;
            return Err(e);
        }

        let attached = match self.runtime.attach_container(&container_id).await {
            Ok(attached) => attached,
            Err(e) => {
                let _ = self.runtime.remove_container(&container_id).await;
                return Err(e);
            }
        };

        let mut output = OutputStore::new(&self.config.log_dir, &spec.name, self.config.screen);
        output.start_capture(attached.output).await?;

        Ok(Trajectory {
            container_id,
            shell: ShellSession::new(attached.input),
            output,
            watermark: 0,
            shell_path: spec.shell_path,
        })
    }

    fn build_spec(&self, trajectory_id: &str, input: &StartSandboxInput) -> SandboxSpec {
        let mut env: Vec<String> = input
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        env.sort();

        SandboxSpec {
            name: trajectory_id.to_string(),
            image: input.image_id.clone(),
            user: input.user.clone(),
            working_dir: input.working_dir.clone(),
            shell_path: input
                .shell_path
                .clone()
                .unwrap_or_else(|| self.config.shell_default.clone()),
            network_disabled: input.network_disabled,
            env,
            labels: HashMap::from([
                (TRAJECTORY_LABEL.to_string(), trajectory_id.to_string()),
                (MANAGED_BY_LABEL.to_string(), self.config.managed_by.clone()),
            ]),
        }
    }

    /// Execute a command against a live trajectory.
    ///
    /// Interactive commands are written to the attached shell; the call then
    /// sleeps for `timeout_in_seconds` (zero means no sleep) and snapshots
    /// the output that accumulated since the last read. Non-interactive
    /// commands run as a one-shot exec with `timeout_in_seconds` as a hard
    /// deadline.
    #[instrument(skip(self, input), fields(trajectory = %trajectory_id, interactive = input.is_interactive))]
    pub async fn run_command(
        &self,
        trajectory_id: &str,
        input: &RunCommandInput,
    ) -> Result<CommandOutcome> {
        let entry = self.lookup(trajectory_id).await?;
        let mut guard = entry.lock().await;
        let trajectory = &mut *guard;

        if input.is_interactive {
            self.run_interactive(trajectory, input).await
        } else {
            self.run_exec(trajectory, input).await
        }
    }

    async fn run_interactive(
        &self,
        trajectory: &mut Trajectory,
        input: &RunCommandInput,
    ) -> Result<CommandOutcome> {
        trajectory
            .shell
            .write_command(&input.command, self.config.marker_mode)
            .await?;

        if input.timeout_in_seconds > 0 {
            tokio::time::sleep(Duration::from_secs(input.timeout_in_seconds)).await;
        }

        let marker = self
            .config
            .marker_mode
            .then(|| trajectory.shell.marker().to_string());
        let window = trajectory
            .output
            .read_incremental(trajectory.watermark, marker.as_deref())
            .await?;
        trajectory.watermark = trajectory.watermark.max(window.watermark);

        Ok(CommandOutcome {
            output: window.text,
            exit_code: None,
            finished: window.finished,
            timed_out: false,
        })
    }

    async fn run_exec(
        &self,
        trajectory: &mut Trajectory,
        input: &RunCommandInput,
    ) -> Result<CommandOutcome> {
        let shell = input
            .shell_path
            .clone()
            .unwrap_or_else(|| trajectory.shell_path.clone());
        let cmd = vec![shell, "-c".to_string(), input.command.clone()];

        let env = input.env.as_ref().map(|map| {
            let mut entries: Vec<String> =
                map.iter().map(|(k, v)| format!("{k}={v}")).collect();
            entries.sort();
            entries
        });
        let opts = ExecOptions {
            working_dir: input.working_dir.clone(),
            env,
            user: None,
        };

        let exec = self.runtime.exec(&trajectory.container_id, &cmd, &opts);
        let result = if input.timeout_in_seconds > 0 {
            match tokio::time::timeout(Duration::from_secs(input.timeout_in_seconds), exec).await {
                Ok(result) => result,
                Err(_) => {
                    // The exec is abandoned; whatever it printed stays in the
                    // container
                    return Ok(CommandOutcome {
                        output: String::new(),
                        exit_code: None,
                        finished: false,
                        timed_out: true,
                    });
                }
            }
        } else {
            exec.await
        };

        let (exit_code, stdout, stderr) = result?;
        let mut output = stdout;
        output.push_str(&stderr);

        Ok(CommandOutcome {
            output,
            exit_code: Some(exit_code),
            finished: true,
            timed_out: false,
        })
    }

    /// Return the cleaned output that appeared since the last read and
    /// advance the trajectory's watermark past it.
    #[instrument(skip(self), fields(trajectory = %trajectory_id))]
    pub async fn get_output(&self, trajectory_id: &str) -> Result<(String, bool)> {
        let entry = self.lookup(trajectory_id).await?;
        let mut guard = entry.lock().await;
        let trajectory = &mut *guard;

        let marker = self
            .config
            .marker_mode
            .then(|| trajectory.shell.marker().to_string());
        let window = trajectory
            .output
            .read_incremental(trajectory.watermark, marker.as_deref())
            .await?;
        trajectory.watermark = trajectory.watermark.max(window.watermark);

        Ok((window.text, window.finished))
    }

    /// Stop and remove a trajectory's container and forget the trajectory.
    ///
    /// Best effort and idempotent: a shutdown for an unknown id succeeds
    /// silently, and runtime errors are logged rather than returned.
    #[instrument(skip(self), fields(trajectory = %trajectory_id))]
    pub async fn shutdown_sandbox(&self, trajectory_id: &str) -> Result<()> {
        let entry = self.trajectories.write().await.remove(trajectory_id);
        let Some(entry) = entry else {
            debug!(trajectory = %trajectory_id, "shutdown for unknown trajectory");
            return Ok(());
        };

        let teardown = async {
            let mut guard = entry.lock().await;
            let trajectory = &mut *guard;

            // Half-close stdin so the shell sees EOF even if stop is slow
            trajectory.shell.close().await;

            if let Err(e) = self
                .runtime
                .stop_container(&trajectory.container_id, self.config.stop_timeout)
                .await
            {
                warn!(container = %trajectory.container_id, error = %e, "failed to stop container");
            }
            if let Err(e) = self.runtime.remove_container(&trajectory.container_id).await {
                warn!(container = %trajectory.container_id, error = %e, "failed to remove container");
            }

            // Container removal closes the PTY; wait for the pump to flush
            trajectory.output.wait_until_closed().await;
        };

        if tokio::time::timeout(self.config.shutdown_deadline, teardown)
            .await
            .is_err()
        {
            warn!(trajectory = %trajectory_id, "shutdown deadline exceeded");
        }

        info!(trajectory = %trajectory_id, "sandbox shut down");
        Ok(())
    }

    /// Stop and remove every container carrying this daemon's managed-by
    /// label. Used on boot (to destroy orphans from previous runs) and on
    /// daemon shutdown. Per-container failures are logged and do not abort
    /// the sweep.
    #[instrument(skip(self))]
    pub async fn cleanup_all(&self) -> Result<()> {
        let ids = self
            .runtime
            .list_managed(MANAGED_BY_LABEL, &self.config.managed_by)
            .await?;

        info!(count = ids.len(), "cleaning up managed containers");

        for container_id in ids {
            if let Err(e) = self
                .runtime
                .stop_container(&container_id, self.config.stop_timeout)
                .await
            {
                warn!(container = %container_id, error = %e, "failed to stop container during sweep");
            }
            if let Err(e) = self.runtime.remove_container(&container_id).await {
                warn!(container = %container_id, error = %e, "failed to remove container during sweep");
            }
        }

        self.trajectories.write().await.clear();
        Ok(())
    }

    async fn lookup(&self, trajectory_id: &str) -> Result<Arc<Mutex<Trajectory>>> {
        self.trajectories
            .read()
            .await
            .get(trajectory_id)
            .cloned()
            .ok_or_else(|| AgentError::TrajectoryNotFound(trajectory_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{AttachedShell, MockRuntime};

    fn test_config(dir: &std::path::Path, marker_mode: bool) -> CoreConfig {
        CoreConfig {
            marker_mode,
            log_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn start_input() -> StartSandboxInput {
        StartSandboxInput {
            image_id: "ubuntu:latest".to_string(),
            user: "root".to_string(),
            working_dir: "/".to_string(),
            shell_path: None,
            network_disabled: false,
            env: HashMap::new(),
        }
    }

    fn interactive(command: &str, timeout: u64) -> RunCommandInput {
        RunCommandInput {
            command: command.to_string(),
            timeout_in_seconds: timeout,
            is_interactive: true,
            working_dir: None,
            env: None,
            shell_path: None,
        }
    }

    fn exec(command: &str, timeout: u64) -> RunCommandInput {
        RunCommandInput {
            is_interactive: false,
            ..interactive(command, timeout)
        }
    }

    fn manager(dir: &std::path::Path, marker_mode: bool) -> TrajectoryManager {
        TrajectoryManager::new(test_config(dir, marker_mode), Arc::new(MockRuntime::new()))
    }

    #[tokio::test]
    async fn test_start_then_get_output() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        manager.start_sandbox("t1", &start_input()).await.unwrap();
        assert!(manager.contains("t1").await);

        let (_output, finished) = manager.get_output("t1").await.unwrap();
        assert!(!finished);
    }

    #[tokio::test]
    async fn test_start_duplicate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        manager.start_sandbox("t1", &start_input()).await.unwrap();

        let err = manager.start_sandbox("t1", &start_input()).await.unwrap_err();
        assert!(matches!(err, AgentError::TrajectoryExists(_)));
        assert_eq!(manager.trajectory_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_start_leaves_no_entry() {
        struct FailingStart(MockRuntime);

        #[async_trait::async_trait]
        impl Runtime for FailingStart {
            async fn pull_image(&self, image: &str) -> Result<()> {
                self.0.pull_image(image).await
            }
            async fn create_container(&self, spec: &SandboxSpec) -> Result<String> {
                self.0.create_container(spec).await
            }
            async fn start_container(&self, id: &str) -> Result<()> {
                Err(AgentError::StartFailed {
                    id: id.to_string(),
                    reason: "no such runtime".to_string(),
                })
            }
            async fn attach_container(&self, id: &str) -> Result<AttachedShell> {
                self.0.attach_container(id).await
            }
            async fn exec(
                &self,
                id: &str,
                cmd: &[String],
                opts: &ExecOptions,
            ) -> Result<(i64, String, String)> {
                self.0.exec(id, cmd, opts).await
            }
            async fn stop_container(&self, id: &str, timeout: Duration) -> Result<()> {
                self.0.stop_container(id, timeout).await
            }
            async fn remove_container(&self, id: &str) -> Result<()> {
                self.0.remove_container(id).await
            }
            async fn list_managed(&self, label: &str, value: &str) -> Result<Vec<String>> {
                self.0.list_managed(label, value).await
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let manager = TrajectoryManager::new(
            test_config(dir.path(), false),
            Arc::new(FailingStart(MockRuntime::new())),
        );

        let err = manager.start_sandbox("t1", &start_input()).await.unwrap_err();
        assert!(err.is_start_failure());
        assert!(!manager.contains("t1").await);
        // The container created before the failed start was rolled back
        assert!(manager.cleanup_all().await.is_ok());
    }

    #[tokio::test]
    async fn test_interactive_command_output() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        manager.start_sandbox("t1", &start_input()).await.unwrap();

        let outcome = manager
            .run_command("t1", &interactive("echo hello", 1))
            .await
            .unwrap();
        assert!(outcome.output.contains("hello"));
        assert!(outcome.exit_code.is_none());
    }

    #[tokio::test]
    async fn test_watermark_advances_between_commands() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        manager.start_sandbox("t1", &start_input()).await.unwrap();

        let first = manager
            .run_command("t1", &interactive("echo AAA", 1))
            .await
            .unwrap();
        assert!(first.output.contains("AAA"));

        let second = manager
            .run_command("t1", &interactive("echo BBB", 1))
            .await
            .unwrap();
        assert!(second.output.contains("BBB"));
        assert!(!second.output.contains("AAA"));
    }

    #[tokio::test]
    async fn test_repeated_get_output_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        manager.start_sandbox("t1", &start_input()).await.unwrap();

        manager
            .run_command("t1", &interactive("echo once", 1))
            .await
            .unwrap();
        // The run already consumed the window; nothing new has arrived since
        let (first, _) = manager.get_output("t1").await.unwrap();
        let (second, _) = manager.get_output("t1").await.unwrap();
        assert_eq!(first, "");
        assert_eq!(second, "");
    }

    #[tokio::test]
    async fn test_zero_timeout_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        manager.start_sandbox("t1", &start_input()).await.unwrap();

        let started = std::time::Instant::now();
        manager
            .run_command("t1", &interactive("echo fast", 0))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_control_signal_does_not_hang() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        manager.start_sandbox("t1", &start_input()).await.unwrap();

        manager
            .run_command("t1", &interactive("sleep 30", 0))
            .await
            .unwrap();
        let outcome = tokio::time::timeout(
            Duration::from_secs(3),
            manager.run_command("t1", &interactive("^C", 1)),
        )
        .await
        .expect("interrupt must not hang")
        .unwrap();
        assert!(outcome.exit_code.is_none());
    }

    #[tokio::test]
    async fn test_run_on_missing_trajectory() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        let err = manager
            .run_command("ghost", &interactive("echo hi", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::TrajectoryNotFound(_)));
    }

    #[tokio::test]
    async fn test_exec_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        manager.start_sandbox("t1", &start_input()).await.unwrap();

        let ok = manager.run_command("t1", &exec("true", 0)).await.unwrap();
        assert_eq!(ok.exit_code, Some(0));
        assert!(ok.output.is_empty());
        assert!(ok.finished);

        let failed = manager.run_command("t1", &exec("false", 0)).await.unwrap();
        assert_eq!(failed.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_exec_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        manager.start_sandbox("t1", &start_input()).await.unwrap();

        let outcome = manager.run_command("t1", &exec("sleep 5", 1)).await.unwrap();
        assert!(outcome.timed_out);
        assert!(outcome.exit_code.is_none());
    }

    #[tokio::test]
    async fn test_marker_mode_detects_completion() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), true);
        manager.start_sandbox("t1", &start_input()).await.unwrap();

        let outcome = manager
            .run_command("t1", &interactive("echo task-output", 1))
            .await
            .unwrap();
        assert!(outcome.finished);
        assert!(outcome.output.contains("task-output"));
        assert!(!outcome.output.contains("__CMD_DONE__"));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), false);
        manager.start_sandbox("t1", &start_input()).await.unwrap();

        manager.shutdown_sandbox("t1").await.unwrap();
        assert!(!manager.contains("t1").await);
        manager.shutdown_sandbox("t1").await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_all_sweeps_labelled_containers() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(MockRuntime::new());
        let manager =
            TrajectoryManager::new(test_config(dir.path(), false), runtime.clone());

        for id in ["t1", "t2", "t3"] {
            manager.start_sandbox(id, &start_input()).await.unwrap();
        }
        assert_eq!(manager.trajectory_count().await, 3);

        manager.cleanup_all().await.unwrap();
        assert_eq!(manager.trajectory_count().await, 0);
        let remaining = runtime.list_managed(MANAGED_BY_LABEL, "rollhost").await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_boot_sweep_destroys_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(MockRuntime::new());

        // A previous daemon run left containers behind
        let old_manager =
            TrajectoryManager::new(test_config(dir.path(), false), runtime.clone());
        for id in ["t1", "t2", "t3"] {
            old_manager.start_sandbox(id, &start_input()).await.unwrap();
        }
        drop(old_manager);

        // The next run's boot sweep starts from an empty table and finds
        // the orphans by label
        let new_manager =
            TrajectoryManager::new(test_config(dir.path(), false), runtime.clone());
        assert_eq!(new_manager.trajectory_count().await, 0);
        new_manager.cleanup_all().await.unwrap();

        let remaining = runtime.list_managed(MANAGED_BY_LABEL, "rollhost").await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_parallel_trajectories() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(manager(dir.path(), false));
        manager.start_sandbox("t1", &start_input()).await.unwrap();
        manager.start_sandbox("t2", &start_input()).await.unwrap();

        let a = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .run_command("t1", &interactive("echo first", 1))
                    .await
                    .unwrap()
            })
        };
        let b = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .run_command("t2", &interactive("echo second", 1))
                    .await
                    .unwrap()
            })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a.output.contains("first"));
        assert!(b.output.contains("second"));
    }
}
