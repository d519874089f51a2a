//! rollhost API - HTTP surface for the sandbox daemon
//!
//! Provides:
//! - Sandbox lifecycle endpoints (`/start_sandbox`, `/run_command`,
//!   `/shutdown_sandbox`, `/get_output`)
//! - Health probes
//! - OpenAPI documentation with Swagger UI
//!
//! Handlers validate the payload and forward to a single
//! [`rollhost_agent::TrajectoryManager`] method; all sandbox semantics live
//! in the agent crate.

pub mod config;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod router;
pub mod server;

pub use config::{ApiConfig, CorsConfig};
pub use error::{ApiError, ErrorResponse, Result};
pub use handlers::sandbox::SandboxState;
pub use openapi::ApiDoc;
pub use router::build_router;
pub use server::ApiServer;
