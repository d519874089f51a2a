//! Concrete container runtime backends

pub mod docker;

pub use docker::DockerRuntime;
