//! OpenAPI documentation

use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::handlers::health::HealthResponse;
use crate::handlers::sandbox::{AckResponse, RunCommandResponse};
use rollhost_core::model::{RolloutRequest, RunCommandInput, StartSandboxInput};

/// OpenAPI documentation for the sandbox daemon
#[derive(OpenApi)]
#[openapi(
    info(
        title = "rollhost API",
        description = "Host-side sandbox daemon brokering container-backed shell sessions for RL agent rollouts",
    ),
    paths(
        crate::handlers::sandbox::start_sandbox,
        crate::handlers::sandbox::run_command,
        crate::handlers::sandbox::shutdown_sandbox,
        crate::handlers::sandbox::get_output,
        crate::handlers::health::liveness,
        crate::handlers::health::readiness,
    ),
    components(schemas(
        RolloutRequest,
        StartSandboxInput,
        RunCommandInput,
        AckResponse,
        RunCommandResponse,
        HealthResponse,
        ErrorResponse,
    )),
    tags(
        (name = "Sandbox", description = "Trajectory lifecycle and command execution"),
        (name = "Health", description = "Liveness and readiness probes"),
    )
)]
pub struct ApiDoc;
