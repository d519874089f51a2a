//! Wire model shared by the HTTP surface and the trajectory manager.
//!
//! Request bodies carry a common envelope (`id`, `trajectory`,
//! `request_type`) plus a per-type payload.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// Numeric request discriminator carried in the envelope.
///
/// The route already determines the operation; the field is kept on the wire
/// for compatibility with callers that set it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "u8", into = "u8")]
pub enum RequestType {
    #[default]
    RunCommand,
    GetOutput,
    StartSandbox,
    ShutdownSandbox,
}

impl TryFrom<u8> for RequestType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::RunCommand),
            1 => Ok(Self::GetOutput),
            2 => Ok(Self::StartSandbox),
            3 => Ok(Self::ShutdownSandbox),
            other => Err(format!("unknown request type {other}")),
        }
    }
}

impl From<RequestType> for u8 {
    fn from(value: RequestType) -> Self {
        match value {
            RequestType::RunCommand => 0,
            RequestType::GetOutput => 1,
            RequestType::StartSandbox => 2,
            RequestType::ShutdownSandbox => 3,
        }
    }
}

/// Request envelope accepted by the sandbox endpoints
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RolloutRequest {
    /// Caller-chosen request id, echoed back in responses
    #[serde(default)]
    pub id: String,

    /// Trajectory this request targets. Used verbatim as the container name
    /// and the log file key.
    #[serde(rename = "trajectory")]
    pub trajectory_id: String,

    #[serde(default)]
    #[schema(value_type = u8)]
    pub request_type: RequestType,

    /// Payload for `start_sandbox` requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_sandbox_input: Option<StartSandboxInput>,

    /// Payload for `run_command` requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_command_input: Option<RunCommandInput>,
}

/// Parameters for creating a sandbox container
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StartSandboxInput {
    /// Image reference, pulled if not present locally
    pub image_id: String,

    /// User the shell runs as inside the container
    #[serde(default)]
    pub user: String,

    /// Working directory of the attached shell
    #[serde(default)]
    pub working_dir: String,

    /// Shell binary to launch; falls back to the daemon default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_path: Option<String>,

    /// Run the container without network access
    #[serde(default)]
    pub network_disabled: bool,

    /// Extra environment variables set in the container
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

/// Parameters for executing a command against a trajectory
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunCommandInput {
    /// Command text, or a caret-escaped control sequence such as `^C`
    pub command: String,

    /// Interactive mode: how long to wait before snapshotting output.
    /// Non-interactive mode: exec deadline (0 means no deadline).
    #[serde(default)]
    pub timeout_in_seconds: u64,

    /// Interactive commands go through the attached shell; non-interactive
    /// ones run as a one-shot exec.
    #[serde(default)]
    pub is_interactive: bool,

    /// Working directory for non-interactive execs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Extra environment variables for non-interactive execs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,

    /// Shell used to wrap non-interactive execs; falls back to the shell the
    /// trajectory was created with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_path: Option<String>,
}

/// Coarse outcome classification carried on every command response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Finished,
    Timeout,
    InstanceStartError,
    InternalError,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finished => "finished",
            Self::Timeout => "timeout",
            Self::InstanceStartError => "instance_start_error",
            Self::InternalError => "internal_error",
        }
    }
}

/// Granular return reason accompanying the coarse status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReturnReason {
    CommandExecutionSuccess,
    CommandExecutionError,
    CommandExecutionTimeout,
    InstanceStartError,
    InternalError,
}

impl ReturnReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommandExecutionSuccess => "command_execution_success",
            Self::CommandExecutionError => "command_execution_error",
            Self::CommandExecutionTimeout => "command_execution_timeout",
            Self::InstanceStartError => "instance_start_error",
            Self::InternalError => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_type_roundtrip() {
        for raw in 0u8..=3 {
            let parsed = RequestType::try_from(raw).unwrap();
            assert_eq!(u8::from(parsed), raw);
        }
        assert!(RequestType::try_from(7).is_err());
    }

    #[test]
    fn test_envelope_deserializes_client_payload() {
        let body = r#"{
            "id": "start-001",
            "trajectory": "test-trajectory-1",
            "request_type": 2,
            "start_sandbox_input": {
                "image_id": "ubuntu:latest",
                "user": "root",
                "working_dir": "/testbed",
                "network_disabled": false,
                "shell_path": "/bin/bash"
            }
        }"#;
        let req: RolloutRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.trajectory_id, "test-trajectory-1");
        assert_eq!(req.request_type, RequestType::StartSandbox);
        let input = req.start_sandbox_input.unwrap();
        assert_eq!(input.image_id, "ubuntu:latest");
        assert_eq!(input.shell_path.as_deref(), Some("/bin/bash"));
        assert!(input.env.is_empty());
    }

    #[test]
    fn test_run_command_defaults() {
        let body = r#"{
            "id": "cmd-001",
            "trajectory": "t1",
            "run_command_input": {"command": "echo hello"}
        }"#;
        let req: RolloutRequest = serde_json::from_str(body).unwrap();
        let input = req.run_command_input.unwrap();
        assert_eq!(input.command, "echo hello");
        assert_eq!(input.timeout_in_seconds, 0);
        assert!(!input.is_interactive);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&InstanceStatus::InstanceStartError).unwrap(),
            "\"instance_start_error\""
        );
        assert_eq!(
            serde_json::to_string(&ReturnReason::CommandExecutionTimeout).unwrap(),
            "\"command_execution_timeout\""
        );
        assert_eq!(InstanceStatus::Finished.as_str(), "finished");
    }
}
