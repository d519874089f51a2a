//! Abstract container runtime interface
//!
//! Defines the Runtime trait the trajectory manager drives, so the daemon
//! can run against the Docker daemon in production and an in-memory mock in
//! tests.

use crate::error::{AgentError, Result};
use bytes::Bytes;
use futures_util::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Byte stream draining a container's attached TTY
pub type OutputStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Write side of a container's attached TTY
pub type InputSink = Pin<Box<dyn AsyncWrite + Send>>;

/// Both halves of an attached container TTY
pub struct AttachedShell {
    pub input: InputSink,
    pub output: OutputStream,
}

/// Options for a one-shot exec inside a running container
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub working_dir: Option<String>,
    pub env: Option<Vec<String>>,
    pub user: Option<String>,
}

/// Creation parameters for a sandbox container
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    /// Container name; the trajectory id verbatim
    pub name: String,
    /// Image reference
    pub image: String,
    /// User the entrypoint runs as (empty for the image default)
    pub user: String,
    /// Working directory of the entrypoint
    pub working_dir: String,
    /// Shell binary launched as the container entrypoint
    pub shell_path: String,
    /// Run without network access
    pub network_disabled: bool,
    /// Extra KEY=VALUE environment entries
    pub env: Vec<String>,
    /// Labels stamped on the container; cleanup sweeps filter on these
    pub labels: HashMap<String, String>,
}

/// Abstract container runtime trait
#[async_trait::async_trait]
pub trait Runtime: Send + Sync {
    /// Pull an image to local storage if it is not already present
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Create a container from the given spec; returns the runtime's
    /// container id
    async fn create_container(&self, spec: &SandboxSpec) -> Result<String>;

    /// Start a created container
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Attach to a running container's TTY
    async fn attach_container(&self, id: &str) -> Result<AttachedShell>;

    /// Execute a command inside a running container.
    ///
    /// Returns `(exit_code, stdout, stderr)`.
    async fn exec(
        &self,
        id: &str,
        cmd: &[String],
        opts: &ExecOptions,
    ) -> Result<(i64, String, String)>;

    /// Stop a container, giving it `timeout` before the kill
    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<()>;

    /// Force-remove a container together with its volumes
    async fn remove_container(&self, id: &str) -> Result<()>;

    /// List ids of all containers (running or not) carrying `label=value`
    async fn list_managed(&self, label: &str, value: &str) -> Result<Vec<String>>;
}

struct MockContainer {
    spec: SandboxSpec,
    running: bool,
}

/// In-memory mock runtime for testing and development.
///
/// Attach hands out a duplex pipe driven by a scripted shell: every byte
/// written is echoed back (TTY echo), and completed lines are scanned for
/// `echo <arg>` segments whose argument is written back as output. `exec`
/// understands `true`, `false`, `echo ...`, and `sleep <secs>`.
pub struct MockRuntime {
    containers: tokio::sync::RwLock<HashMap<String, MockContainer>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            containers: tokio::sync::RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Runtime for MockRuntime {
    async fn pull_image(&self, _image: &str) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(())
    }

    async fn create_container(&self, spec: &SandboxSpec) -> Result<String> {
        let mut containers = self.containers.write().await;
        if containers.contains_key(&spec.name) {
            // Name conflicts fail at the runtime, exactly like Docker
            return Err(AgentError::CreateFailed {
                id: spec.name.clone(),
                reason: "container name already in use".to_string(),
            });
        }
        containers.insert(
            spec.name.clone(),
            MockContainer {
                spec: spec.clone(),
                running: false,
            },
        );
        Ok(spec.name.clone())
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut containers = self.containers.write().await;
        let container = containers.get_mut(id).ok_or_else(|| AgentError::NotFound {
            container: id.to_string(),
            reason: "container not found".to_string(),
        })?;
        container.running = true;
        Ok(())
    }

    async fn attach_container(&self, id: &str) -> Result<AttachedShell> {
        let containers = self.containers.read().await;
        let container = containers.get(id).ok_or_else(|| AgentError::NotFound {
            container: id.to_string(),
            reason: "container not found".to_string(),
        })?;
        if !container.running {
            return Err(AgentError::AttachFailed {
                id: id.to_string(),
                reason: "container is not running".to_string(),
            });
        }

        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        tokio::spawn(mock_shell(server_read, server_write));

        let (client_read, client_write) = tokio::io::split(client);
        Ok(AttachedShell {
            input: Box::pin(client_write),
            output: Box::pin(tokio_util::io::ReaderStream::new(client_read)),
        })
    }

    async fn exec(
        &self,
        id: &str,
        cmd: &[String],
        _opts: &ExecOptions,
    ) -> Result<(i64, String, String)> {
        {
            let containers = self.containers.read().await;
            if !containers.contains_key(id) {
                return Err(AgentError::NotFound {
                    container: id.to_string(),
                    reason: "container not found".to_string(),
                });
            }
        }
        // Interpret `<shell> -c <script>` for a handful of scripted commands
        let script = cmd.last().map(String::as_str).unwrap_or("");
        if let Some(secs) = script
            .strip_prefix("sleep ")
            .and_then(|s| s.trim().parse::<u64>().ok())
        {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            return Ok((0, String::new(), String::new()));
        }
        match script {
            "true" => Ok((0, String::new(), String::new())),
            "false" => Ok((1, String::new(), String::new())),
            s if s.starts_with("echo ") => Ok((0, format!("{}\n", &s[5..]), String::new())),
            _ => Ok((0, String::new(), String::new())),
        }
    }

    async fn stop_container(&self, id: &str, _timeout: Duration) -> Result<()> {
        let mut containers = self.containers.write().await;
        if let Some(container) = containers.get_mut(id) {
            container.running = false;
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let mut containers = self.containers.write().await;
        containers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AgentError::NotFound {
                container: id.to_string(),
                reason: "container not found".to_string(),
            })
    }

    async fn list_managed(&self, label: &str, value: &str) -> Result<Vec<String>> {
        let containers = self.containers.read().await;
        Ok(containers
            .values()
            .filter(|c| c.spec.labels.get(label).map(String::as_str) == Some(value))
            .map(|c| c.spec.name.clone())
            .collect())
    }
}

/// Scripted TTY sitting behind the mock's attach pipe.
async fn mock_shell(
    mut read: tokio::io::ReadHalf<tokio::io::DuplexStream>,
    mut write: tokio::io::WriteHalf<tokio::io::DuplexStream>,
) {
    use tokio::io::AsyncReadExt;

    let mut line = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = match read.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &b in &buf[..n] {
            // A TTY echoes every typed byte
            if write.write_all(&[b]).await.is_err() {
                return;
            }
            if b == b'\n' {
                let text = String::from_utf8_lossy(&line).into_owned();
                line.clear();
                for part in text.split(';') {
                    let part = part.trim();
                    if let Some(arg) = part.strip_prefix("echo ") {
                        if write
                            .write_all(format!("{arg}\r\n").as_bytes())
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
            } else {
                line.push(b);
            }
        }
        if write.flush().await.is_err() {
            return;
        }
    }
}
