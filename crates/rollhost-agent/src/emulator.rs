//! Terminal replay for captured PTY output
//!
//! Commands like `ls --color`, REPLs, and progress bars emit dense control
//! sequences (CSI colour and cursor codes, OSC titles, carriage-return
//! overwrites). Replaying the raw byte stream onto a virtual screen yields
//! the text a human would actually see.

use rollhost_core::ScreenSize;
use vt100::Parser;

/// Replays a raw byte buffer onto a fixed-size virtual screen and projects
/// out the visible text.
#[derive(Debug, Clone, Copy)]
pub struct TerminalEmulator {
    cols: u16,
    rows: u16,
}

impl TerminalEmulator {
    pub fn new(screen: ScreenSize) -> Self {
        Self {
            cols: screen.cols,
            rows: screen.rows,
        }
    }

    /// Replay `bytes` from an initial blank screen and return the visible
    /// text: trailing spaces trimmed per line, fully blank lines dropped.
    ///
    /// Pure and deterministic for a fixed input. Content that scrolls past
    /// the top of the screen is lost.
    pub fn clean(&self, bytes: &[u8]) -> String {
        let mut parser = Parser::new(self.rows, self.cols, 0);
        parser.process(bytes);
        strip_blank_lines(&parser.screen().contents())
    }
}

fn strip_blank_lines(raw: &str) -> String {
    raw.lines()
        .map(|line| line.trim_end())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
