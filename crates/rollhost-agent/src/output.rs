//! Per-trajectory output capture and incremental reads
//!
//! The capture pump drains the attached PTY into an append-only log file
//! for the trajectory's lifetime. Reads replay the whole file through the
//! terminal emulator and slice at a caller-held watermark, because terminal
//! replay is stateful across the full transcript: cleaning only the new
//! bytes would diverge from a full replay.

use crate::emulator::TerminalEmulator;
use crate::error::{AgentError, Result};
use crate::runtime::OutputStream;
use futures_util::StreamExt;
use rollhost_core::ScreenSize;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// On-disk log path for a trajectory id
pub fn log_file_path(log_dir: &Path, trajectory_id: &str) -> PathBuf {
    log_dir.join(format!("container-output-trajectory-{trajectory_id}.txt"))
}

/// A window of cleaned text produced by an incremental read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadWindow {
    /// Cleaned text that appeared past the watermark
    pub text: String,
    /// A completion marker was present in the window
    pub finished: bool,
    /// Length of the full cleaned transcript; the caller's next watermark
    pub watermark: usize,
}

/// Append-only byte log for one trajectory plus its capture pump handle.
pub struct OutputStore {
    path: PathBuf,
    emulator: TerminalEmulator,
    pump: Option<JoinHandle<()>>,
}

impl OutputStore {
    pub fn new(log_dir: &Path, trajectory_id: &str, screen: ScreenSize) -> Self {
        Self {
            path: log_file_path(log_dir, trajectory_id),
            emulator: TerminalEmulator::new(screen),
            pump: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Spawn the capture pump: a background task copying the PTY stream into
    /// the log file until the stream ends. Transport errors end the pump and
    /// are logged; the file is closed on exit either way.
    pub async fn start_capture(&mut self, mut output: OutputStream) -> Result<()> {
        let mut file = File::create(&self.path).await?;
        let path = self.path.clone();

        self.pump = Some(tokio::spawn(async move {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(bytes) => {
                        if let Err(e) = file.write_all(&bytes).await {
                            warn!(path = %path.display(), error = %e, "failed to write captured output");
                            break;
                        }
                        if let Err(e) = file.flush().await {
                            warn!(path = %path.display(), error = %e, "failed to flush captured output");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "error reading container output");
                        break;
                    }
                }
            }
            debug!(path = %path.display(), "capture pump finished");
        }));

        Ok(())
    }

    /// Block until the capture pump has drained and closed the log file.
    /// A no-op when capture was never started or already finished.
    pub async fn wait_until_closed(&mut self) {
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
    }

    /// Read everything the pump has delivered, clean it, and return the
    /// suffix past `watermark` together with the new watermark.
    ///
    /// When a `marker` is supplied, `; echo <marker>` command echoes are
    /// stripped from the window, standalone marker lines are removed, and
    /// `finished` reports whether a standalone marker was present.
    pub async fn read_incremental(
        &self,
        watermark: usize,
        marker: Option<&str>,
    ) -> Result<ReadWindow> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            AgentError::Internal(format!(
                "failed to read output file {}: {e}",
                self.path.display()
            ))
        })?;
        let cleaned = self.clean_guarded(&raw)?;

        let start = floor_char_boundary(&cleaned, watermark.min(cleaned.len()));
        let window = &cleaned[start..];

        let (text, finished) = match marker {
            Some(marker) => strip_marker(window, marker),
            None => (window.to_string(), false),
        };

        Ok(ReadWindow {
            text,
            finished,
            watermark: cleaned.len(),
        })
    }

    // Corrupted escape input must not take the daemon down with it; a panic
    // during replay surfaces as an internal error on this read only.
    fn clean_guarded(&self, raw: &[u8]) -> Result<String> {
        std::panic::catch_unwind(AssertUnwindSafe(|| self.emulator.clean(raw)))
            .map_err(|_| AgentError::Internal("terminal replay panicked".to_string()))
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Remove command echoes of the marker injection and the marker itself.
/// `finished` is true only when a marker survives echo stripping, i.e. the
/// shell actually executed the trailing `echo`.
fn strip_marker(window: &str, marker: &str) -> (String, bool) {
    let echo = format!(" ; echo {marker}");
    let without_echo = window.replace(&echo, "");
    let finished = without_echo.contains(marker);
    let marker_line = format!("{marker}\n");
    let text = without_echo.replace(&marker_line, "").replace(marker, "");
    (text, finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::stream;
    use rollhost_core::ScreenSize;

    fn store(dir: &Path, id: &str) -> OutputStore {
        OutputStore::new(dir, id, ScreenSize::default())
    }

    fn byte_stream(chunks: Vec<Vec<u8>>) -> OutputStream {
        Box::pin(stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c)))))
    }

    #[test]
    fn test_log_file_path() {
        let path = log_file_path(Path::new("/tmp/rollhost"), "t1");
        assert_eq!(
            path,
            PathBuf::from("/tmp/rollhost/container-output-trajectory-t1.txt")
        );
    }

    #[tokio::test]
    async fn test_capture_pump_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path(), "t1");
        store
            .start_capture(byte_stream(vec![b"hello ".to_vec(), b"world\n".to_vec()]))
            .await
            .unwrap();
        store.wait_until_closed().await;

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, "hello world\n");
    }

    #[tokio::test]
    async fn test_incremental_read_advances_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path(), "t1");
        store
            .start_capture(byte_stream(vec![b"A\r\n".to_vec()]))
            .await
            .unwrap();
        store.wait_until_closed().await;

        let first = store.read_incremental(0, None).await.unwrap();
        assert_eq!(first.text, "A");
        assert!(first.watermark > 0);

        // Nothing new arrived, so the next read returns an empty window
        let second = store.read_incremental(first.watermark, None).await.unwrap();
        assert_eq!(second.text, "");
        assert_eq!(second.watermark, first.watermark);
    }

    #[tokio::test]
    async fn test_incremental_read_sees_only_new_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path(), "t1");
        store
            .start_capture(byte_stream(vec![b"A\r\n".to_vec()]))
            .await
            .unwrap();
        store.wait_until_closed().await;
        let first = store.read_incremental(0, None).await.unwrap();

        // Simulate more PTY output arriving after the first read
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(store.path())
            .unwrap();
        file.write_all(b"B\r\n").unwrap();

        let second = store.read_incremental(first.watermark, None).await.unwrap();
        assert!(second.text.contains('B'));
        assert!(!second.text.contains('A'));
        assert!(second.watermark >= first.watermark);
    }

    #[tokio::test]
    async fn test_read_missing_file_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), "absent");
        let err = store.read_incremental(0, None).await.unwrap_err();
        assert!(matches!(err, AgentError::Internal(_)));
    }

    #[tokio::test]
    async fn test_marker_detection_and_stripping() {
        let marker = "__CMD_DONE__abc__";
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path(), "t1");
        // Echoed command line followed by real output and the marker echo
        let transcript = format!("ls ; echo {marker}\r\nfile.txt\r\n{marker}\r\n");
        store
            .start_capture(byte_stream(vec![transcript.into_bytes()]))
            .await
            .unwrap();
        store.wait_until_closed().await;

        let window = store.read_incremental(0, Some(marker)).await.unwrap();
        assert!(window.finished);
        assert!(window.text.contains("file.txt"));
        assert!(!window.text.contains(marker));
        assert!(!window.text.contains("; echo"));
    }

    #[tokio::test]
    async fn test_marker_echo_alone_does_not_finish() {
        let marker = "__CMD_DONE__abc__";
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path(), "t1");
        // Only the typed command echo is present; the command is still running
        let transcript = format!("sleep 30 ; echo {marker}\r\n");
        store
            .start_capture(byte_stream(vec![transcript.into_bytes()]))
            .await
            .unwrap();
        store.wait_until_closed().await;

        let window = store.read_incremental(0, Some(marker)).await.unwrap();
        assert!(!window.finished);
        assert!(!window.text.contains(marker));
    }

    #[test]
    fn test_floor_char_boundary() {
        let s = "héllo";
        // Index 2 falls inside the two-byte 'é'
        assert_eq!(floor_char_boundary(s, 2), 1);
        assert_eq!(floor_char_boundary(s, 3), 3);
        assert_eq!(floor_char_boundary(s, 0), 0);
    }
}
