//! rollhost core - shared configuration, wire model, and logging bootstrap
//!
//! Everything in this crate is plain data and process-wide plumbing; the
//! container and shell machinery lives in `rollhost-agent`.

pub mod config;
pub mod error;
pub mod logging;
pub mod model;

pub use config::{CoreConfig, ScreenSize};
pub use error::{CoreError, Result};
pub use logging::{init_logging, FileLoggingConfig, LogFormat, LogGuard, LogLevel, LoggingConfig};
pub use model::{
    InstanceStatus, RequestType, ReturnReason, RolloutRequest, RunCommandInput, StartSandboxInput,
};
