//! Agent error types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T, E = AgentError> = std::result::Result<T, E>;

/// Errors raised by the container runtime and trajectory machinery
#[derive(Debug, Error)]
pub enum AgentError {
    /// Failed to pull image
    #[error("failed to pull image {image}: {reason}")]
    PullFailed { image: String, reason: String },

    /// Failed to create container
    #[error("failed to create container {id}: {reason}")]
    CreateFailed { id: String, reason: String },

    /// Failed to start container
    #[error("failed to start container {id}: {reason}")]
    StartFailed { id: String, reason: String },

    /// Failed to attach to a running container's TTY
    #[error("failed to attach to container {id}: {reason}")]
    AttachFailed { id: String, reason: String },

    /// One-shot exec failed to run
    #[error("exec failed in container {id}: {reason}")]
    ExecFailed { id: String, reason: String },

    /// Container not found or unreachable
    #[error("container {container} not found: {reason}")]
    NotFound { container: String, reason: String },

    /// No live trajectory with this id
    #[error("trajectory {0} not found")]
    TrajectoryNotFound(String),

    /// A live trajectory already claims this id
    #[error("trajectory {0} already exists")]
    TrajectoryExists(String),

    /// Write to the attached shell failed; the session is unusable
    #[error("shell session write failed: {0}")]
    Session(String),

    /// A component-level deadline elapsed
    #[error("deadline exceeded: {0}")]
    Deadline(String),

    /// Invariant breach or unreadable daemon state
    #[error("{0}")]
    Internal(String),

    /// IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Whether this error means the sandbox instance never came up
    pub fn is_start_failure(&self) -> bool {
        matches!(
            self,
            Self::PullFailed { .. }
                | Self::CreateFailed { .. }
                | Self::StartFailed { .. }
                | Self::AttachFailed { .. }
                | Self::TrajectoryExists(_)
        )
    }
}
