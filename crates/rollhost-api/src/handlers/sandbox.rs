//! Sandbox lifecycle endpoints
//!
//! All POST bodies carry the common request envelope; `get_output` is a GET
//! with query parameters so callers can poll cheaply.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::error::{ApiError, Result};
use rollhost_agent::{CommandOutcome, TrajectoryManager};
use rollhost_core::model::{InstanceStatus, ReturnReason, RolloutRequest};

/// State shared by the sandbox endpoints
#[derive(Clone)]
pub struct SandboxState {
    pub manager: Arc<TrajectoryManager>,
}

/// Acknowledgement returned by the lifecycle endpoints
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AckResponse {
    /// Human-readable progress note
    pub status: String,
}

/// Response body for run_command
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RunCommandResponse {
    /// Progress note, `"command execution initiated"` on acceptance
    pub status: String,
    /// Request id echoed from the envelope
    pub id: String,
    /// Trajectory id echoed from the envelope
    pub trajectory: String,
    /// Cleaned output (interactive) or combined stdout+stderr (exec)
    pub output: String,
    /// Error message, empty on success
    #[serde(default)]
    pub error: String,
    /// Coarse outcome, one of finished/timeout/instance_start_error/internal_error
    pub instance_status: String,
    /// Granular outcome code
    pub return_reason: String,
    /// Exit code for non-interactive execs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
}

fn classify(outcome: &CommandOutcome) -> (InstanceStatus, ReturnReason) {
    if outcome.timed_out {
        (InstanceStatus::Timeout, ReturnReason::CommandExecutionTimeout)
    } else if matches!(outcome.exit_code, Some(code) if code != 0) {
        (InstanceStatus::Finished, ReturnReason::CommandExecutionError)
    } else {
        (
            InstanceStatus::Finished,
            ReturnReason::CommandExecutionSuccess,
        )
    }
}

/// Create a sandbox container for a new trajectory
#[utoipa::path(
    post,
    path = "/start_sandbox",
    request_body = RolloutRequest,
    responses(
        (status = 202, description = "Sandbox creation initiated", body = AckResponse),
        (status = 400, description = "Malformed request"),
        (status = 500, description = "Container runtime failure"),
    ),
    tag = "Sandbox"
)]
pub async fn start_sandbox(
    State(state): State<SandboxState>,
    Json(req): Json<RolloutRequest>,
) -> Result<(StatusCode, Json<AckResponse>)> {
    if req.trajectory_id.is_empty() {
        return Err(ApiError::BadRequest("missing trajectory id".to_string()));
    }
    let input = req
        .start_sandbox_input
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("missing start_sandbox_input".to_string()))?;

    info!(trajectory = %req.trajectory_id, image = %input.image_id, "start sandbox requested");

    state
        .manager
        .start_sandbox(&req.trajectory_id, input)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AckResponse {
            status: "sandbox creation initiated".to_string(),
        }),
    ))
}

/// Run a command against a live trajectory
#[utoipa::path(
    post,
    path = "/run_command",
    request_body = RolloutRequest,
    responses(
        (status = 202, description = "Command accepted; output snapshot included", body = RunCommandResponse),
        (status = 400, description = "Malformed request"),
        (status = 500, description = "Unknown trajectory or runtime failure"),
    ),
    tag = "Sandbox"
)]
pub async fn run_command(
    State(state): State<SandboxState>,
    Json(req): Json<RolloutRequest>,
) -> Result<(StatusCode, Json<RunCommandResponse>)> {
    if req.trajectory_id.is_empty() {
        return Err(ApiError::BadRequest("missing trajectory id".to_string()));
    }
    let input = req
        .run_command_input
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("missing run_command_input".to_string()))?;

    info!(
        trajectory = %req.trajectory_id,
        interactive = input.is_interactive,
        timeout = input.timeout_in_seconds,
        "run command requested"
    );

    let outcome = state.manager.run_command(&req.trajectory_id, input).await?;
    let (instance_status, return_reason) = classify(&outcome);

    Ok((
        StatusCode::ACCEPTED,
        Json(RunCommandResponse {
            status: "command execution initiated".to_string(),
            id: req.id,
            trajectory: req.trajectory_id,
            output: outcome.output,
            error: String::new(),
            instance_status: instance_status.as_str().to_string(),
            return_reason: return_reason.as_str().to_string(),
            exit_code: outcome.exit_code,
        }),
    ))
}

/// Tear down a trajectory's container.
///
/// The handler acknowledges immediately; the stop/remove work proceeds in
/// the background.
#[utoipa::path(
    post,
    path = "/shutdown_sandbox",
    request_body = RolloutRequest,
    responses(
        (status = 202, description = "Sandbox shutdown initiated", body = AckResponse),
        (status = 400, description = "Malformed request"),
    ),
    tag = "Sandbox"
)]
pub async fn shutdown_sandbox(
    State(state): State<SandboxState>,
    Json(req): Json<RolloutRequest>,
) -> Result<(StatusCode, Json<AckResponse>)> {
    if req.trajectory_id.is_empty() {
        return Err(ApiError::BadRequest("missing trajectory id".to_string()));
    }

    info!(trajectory = %req.trajectory_id, "shutdown sandbox requested");

    let manager = state.manager.clone();
    let trajectory_id = req.trajectory_id.clone();
    tokio::spawn(async move {
        if let Err(e) = manager.shutdown_sandbox(&trajectory_id).await {
            warn!(trajectory = %trajectory_id, error = %e, "sandbox shutdown failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(AckResponse {
            status: "sandbox shutdown initiated".to_string(),
        }),
    ))
}

/// Query parameters for get_output
#[derive(Debug, Deserialize, IntoParams)]
pub struct GetOutputQuery {
    /// Trajectory to read from
    pub trajectory_id: String,
    /// Caller request id (unused, accepted for envelope symmetry)
    pub id: String,
}

/// Fetch the cleaned output that appeared since the previous read
#[utoipa::path(
    get,
    path = "/get_output",
    params(GetOutputQuery),
    responses(
        (status = 200, description = "New cleaned output as a JSON string", body = String),
        (status = 400, description = "Missing query parameters"),
        (status = 500, description = "Unknown trajectory or unreadable log"),
    ),
    tag = "Sandbox"
)]
pub async fn get_output(
    State(state): State<SandboxState>,
    Query(query): Query<GetOutputQuery>,
) -> Result<Json<String>> {
    let (output, _finished) = state.manager.get_output(&query.trajectory_id).await?;
    Ok(Json(output))
}
