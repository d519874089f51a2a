//! rollhost agent - sandbox container lifecycle and interactive shell plumbing
//!
//! The pieces, leaves first:
//! - [`emulator`]: replays raw PTY bytes into the text a human would see
//! - [`shell`]: write side of one container's attached TTY plus keystroke
//!   encoding and the completion marker
//! - [`output`]: capture pump and watermark-based incremental reads
//! - [`trajectory`]: the manager coordinating create/run/read/shutdown
//! - [`runtime`] / [`runtimes`]: the container runtime abstraction and its
//!   Docker backend

pub mod emulator;
pub mod error;
pub mod output;
pub mod runtime;
pub mod runtimes;
pub mod shell;
pub mod trajectory;

pub use emulator::TerminalEmulator;
pub use error::{AgentError, Result};
pub use output::{log_file_path, OutputStore, ReadWindow};
pub use runtime::{AttachedShell, ExecOptions, InputSink, MockRuntime, OutputStream, Runtime, SandboxSpec};
pub use runtimes::docker::is_docker_available;
pub use runtimes::DockerRuntime;
pub use shell::{control_signal, encode_input, ShellSession};
pub use trajectory::{CommandOutcome, TrajectoryManager, MANAGED_BY_LABEL, TRAJECTORY_LABEL};
