//! Docker-backed sandbox runtime using bollard
//!
//! Connects to the local Docker daemon and drives the full sandbox
//! lifecycle: pull, create with an attached TTY, start, attach, exec,
//! stop, and remove.

use crate::error::{AgentError, Result};
use crate::runtime::{AttachedShell, ExecOptions, Runtime, SandboxSpec};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    AttachContainerOptions, CreateContainerOptions, CreateImageOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::Docker;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::instrument;

/// Docker-based sandbox runtime
pub struct DockerRuntime {
    docker: Docker,
}

impl std::fmt::Debug for DockerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerRuntime").finish_non_exhaustive()
    }
}

impl DockerRuntime {
    /// Connect to the local Docker daemon using platform defaults
    /// (`/var/run/docker.sock` on Unix) and verify connectivity with a ping.
    pub async fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| AgentError::Internal(format!("failed to connect to Docker: {e}")))?;

        docker
            .ping()
            .await
            .map_err(|e| AgentError::Internal(format!("Docker ping failed: {e}")))?;

        tracing::info!("connected to Docker daemon");
        Ok(Self { docker })
    }

    /// Wrap a pre-configured bollard client
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

/// Parse an image reference into name and tag
fn parse_image_ref(image: &str) -> (&str, &str) {
    // Digest references (image@sha256:...) are used whole
    if image.contains('@') {
        return (image, "");
    }

    if let Some((name, tag)) = image.rsplit_once(':') {
        // A '/' after the ':' means the colon belongs to a registry port
        if !tag.contains('/') {
            return (name, tag);
        }
    }

    (image, "latest")
}

#[async_trait::async_trait]
impl Runtime for DockerRuntime {
    /// Pull an image if it is not already present locally
    #[instrument(skip(self), fields(container.image.name = %image))]
    async fn pull_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            tracing::debug!(image = %image, "image already present, skipping pull");
            return Ok(());
        }

        let (name, tag) = parse_image_ref(image);
        tracing::info!(image = %image, name = %name, tag = %tag, "pulling image");

        let options = CreateImageOptions {
            from_image: Some(name.to_string()),
            tag: if tag.is_empty() {
                None
            } else {
                Some(tag.to_string())
            },
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::debug!(status = %status, "pull progress");
                    }
                }
                Err(e) => {
                    return Err(AgentError::PullFailed {
                        image: image.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(image = %image, "image pulled successfully");
        Ok(())
    }

    /// Create a sandbox container with an allocated TTY and attached stdio
    #[instrument(skip(self, spec), fields(container.name = %spec.name, container.image.name = %spec.image))]
    async fn create_container(&self, spec: &SandboxSpec) -> Result<String> {
        let mut env = vec!["TERM=xterm".to_string(), "LC_ALL=C.UTF-8".to_string()];
        env.extend(spec.env.iter().cloned());

        let network_mode = if spec.network_disabled { "none" } else { "bridge" };
        let host_config = HostConfig {
            network_mode: Some(network_mode.to_string()),
            ..Default::default()
        };

        let config = ContainerCreateBody {
            image: Some(spec.image.clone()),
            env: Some(env),
            user: if spec.user.is_empty() {
                None
            } else {
                Some(spec.user.clone())
            },
            entrypoint: Some(vec![spec.shell_path.clone()]),
            working_dir: if spec.working_dir.is_empty() {
                None
            } else {
                Some(spec.working_dir.clone())
            },
            labels: Some(spec.labels.clone()),
            network_disabled: Some(spec.network_disabled),
            tty: Some(true),
            open_stdin: Some(true),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: Some(spec.name.clone()),
            platform: String::new(),
        };

        tracing::info!(container = %spec.name, image = %spec.image, "creating container");

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| AgentError::CreateFailed {
                id: spec.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(response.id)
    }

    #[instrument(skip(self), fields(container.id = %id))]
    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(|e| AgentError::StartFailed {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(container = %id, "container started");
        Ok(())
    }

    /// Attach to the container's TTY. The returned input half carries
    /// keystrokes in; the output half yields the rendered byte stream and
    /// closes when the container goes away.
    #[instrument(skip(self), fields(container.id = %id))]
    async fn attach_container(&self, id: &str) -> Result<AttachedShell> {
        let options = AttachContainerOptions {
            stream: true,
            stdin: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let results = self
            .docker
            .attach_container(id, Some(options))
            .await
            .map_err(|e| AgentError::AttachFailed {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        let output = results.output.map(|item| match item {
            Ok(log) => Ok(log.into_bytes()),
            Err(e) => Err(std::io::Error::other(e)),
        });

        tracing::info!(container = %id, "attached to container TTY");

        Ok(AttachedShell {
            input: results.input,
            output: Box::pin(output),
        })
    }

    /// Run a one-shot command in the container and collect its output
    #[instrument(skip(self, cmd, opts), fields(container.id = %id))]
    async fn exec(
        &self,
        id: &str,
        cmd: &[String],
        opts: &ExecOptions,
    ) -> Result<(i64, String, String)> {
        let exec_options = CreateExecOptions {
            cmd: Some(cmd.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            working_dir: opts.working_dir.clone(),
            env: opts.env.clone(),
            user: opts.user.clone(),
            ..Default::default()
        };

        let created = self
            .docker
            .create_exec(id, exec_options)
            .await
            .map_err(|e| AgentError::ExecFailed {
                id: id.to_string(),
                reason: format!("failed to create exec: {e}"),
            })?;

        let start_result = self
            .docker
            .start_exec(&created.id, None)
            .await
            .map_err(|e| AgentError::ExecFailed {
                id: id.to_string(),
                reason: format!("failed to start exec: {e}"),
            })?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        match start_result {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(result) = output.next().await {
                    match result {
                        Ok(bollard::container::LogOutput::StdOut { message }) => {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(bollard::container::LogOutput::StdErr { message }) => {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "error reading exec output");
                        }
                    }
                }
            }
            StartExecResults::Detached => {
                tracing::warn!("exec started in detached mode unexpectedly");
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&created.id)
            .await
            .map_err(|e| AgentError::ExecFailed {
                id: id.to_string(),
                reason: format!("failed to inspect exec: {e}"),
            })?;

        let exit_code = inspect.exit_code.unwrap_or(0);

        tracing::debug!(
            container = %id,
            exit_code = exit_code,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "exec completed"
        );

        Ok((exit_code, stdout, stderr))
    }

    #[instrument(skip(self), fields(container.id = %id, timeout_ms = %timeout.as_millis()))]
    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<()> {
        let options = StopContainerOptions {
            t: Some(timeout.as_secs() as i32),
            signal: None,
        };

        self.docker
            .stop_container(id, Some(options))
            .await
            .map_err(|e| AgentError::NotFound {
                container: id.to_string(),
                reason: format!("failed to stop container: {e}"),
            })?;

        tracing::info!(container = %id, "container stopped");
        Ok(())
    }

    #[instrument(skip(self), fields(container.id = %id))]
    async fn remove_container(&self, id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| AgentError::NotFound {
                container: id.to_string(),
                reason: format!("failed to remove container: {e}"),
            })?;

        tracing::info!(container = %id, "container removed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_managed(&self, label: &str, value: &str) -> Result<Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{label}={value}")]);

        let options = ListContainersOptions {
            all: true,
            filters: Some(filters),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| AgentError::Internal(format!("failed to list containers: {e}")))?;

        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }
}

/// Check if the Docker daemon is available and responsive
pub async fn is_docker_available() -> bool {
    match Docker::connect_with_local_defaults() {
        Ok(docker) => match docker.ping().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Docker daemon ping failed");
                false
            }
        },
        Err(e) => {
            tracing::debug!(error = %e, "failed to connect to Docker daemon");
            false
        }
    }
}
