//! Attached shell session for a sandbox container
//!
//! Owns the write side of the container's PTY. All reading happens through
//! the capture pump and the output store; the session itself never reads.

use crate::error::{AgentError, Result};
use std::pin::Pin;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

/// Sentinel echoed after each command when marker mode is enabled. Unique
/// per session so transcripts from different trajectories cannot collide.
fn new_marker() -> String {
    format!("__CMD_DONE__{}__", Uuid::new_v4())
}

/// Write half of one container's attached PTY plus the session marker.
pub struct ShellSession {
    input: Pin<Box<dyn AsyncWrite + Send>>,
    marker: String,
}

impl ShellSession {
    pub fn new(input: Pin<Box<dyn AsyncWrite + Send>>) -> Self {
        Self {
            input,
            marker: new_marker(),
        }
    }

    /// The session's completion sentinel
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Write a command line to the shell's stdin.
    ///
    /// A pure control signal (exactly `^X`) is sent as its single control
    /// byte with no newline and no marker, so interactive programs can be
    /// interrupted mid-run. Anything else is caret-decoded, optionally
    /// wrapped with `; echo <marker>`, and newline-terminated.
    pub async fn write_command(&mut self, command: &str, with_marker: bool) -> Result<()> {
        if let Some(ctrl) = control_signal(command) {
            return self.send(&[ctrl]).await;
        }

        let line = if with_marker {
            format!("{command} ; echo {}\n", self.marker)
        } else {
            format!("{command}\n")
        };
        self.send(&encode_input(&line)).await
    }

    /// Write raw bytes to the PTY. A failure here is fatal for the session.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.input
            .write_all(bytes)
            .await
            .map_err(|e| AgentError::Session(e.to_string()))?;
        self.input
            .flush()
            .await
            .map_err(|e| AgentError::Session(e.to_string()))
    }

    /// Half-close the PTY write side so the container sees EOF on stdin.
    pub async fn close(&mut self) {
        let _ = self.input.shutdown().await;
    }
}

/// A two-byte `^X` input is a pure control signal; returns the control byte.
pub fn control_signal(text: &str) -> Option<u8> {
    match text.as_bytes() {
        [b'^', c] if (64..=95).contains(c) => Some(c - 64),
        _ => None,
    }
}

/// Decode caret escapes: `^X` with `X` in `[@A-Z\]^_]` (codepoints 64 to 95)
/// becomes the control byte `X - 64`. Escapes may interleave with ordinary
/// characters. A caret before anything else passes through literally, and a
/// trailing caret is dropped.
pub fn encode_input(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'^' {
            match bytes.get(i + 1) {
                Some(&c) if (64..=95).contains(&c) => {
                    out.push(c - 64);
                    i += 2;
                }
                Some(&c) => {
                    out.push(b'^');
                    out.push(c);
                    i += 2;
                }
                None => break,
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    out
}
