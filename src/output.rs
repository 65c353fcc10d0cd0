//! Incremental scanning of toolchain output.
//!
//! Child processes deliver their output in arbitrary chunks. [`LineBuffer`]
//! reassembles those into complete lines, and [`OutputParser`] walks the
//! simulator's lines looking for the final register dump:
//!
//! ```text
//! --- Final Register State ---
//! t0 (x0): 0x000F (15)
//! ...
//! PC: 0x0010
//! ---------------------------
//! ```
//!
//! Anything inside the section that doesn't look like `name: value` is
//! skipped rather than treated as an error.

use std::sync::LazyLock;

use regex::Regex;

use crate::config;
use crate::registers::RegisterTable;

/// Splits a byte stream into lines, holding back any unterminated tail.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every line it completed, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(decode_line)
            .collect()
    }

    /// Returns the unterminated tail, if any, as a final line.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.pending);
        Some(decode_line(&tail))
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum SectionState {
    #[default]
    Scanning,
    InRegisterSection,
    /// The closing banner was seen; nothing more is extracted this run.
    Finished,
}

#[derive(Debug, Default)]
pub struct OutputParser {
    state: SectionState,
    lines: LineBuffer,
}

impl OutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SectionState {
        self.state
    }

    /// Forgets all scan state, including any buffered partial line.
    pub fn reset(&mut self) {
        self.state = SectionState::Scanning;
        self.lines.clear();
    }

    /// Consumes one chunk of output. Returns the completed lines for display.
    pub fn feed(&mut self, chunk: &[u8], registers: &mut RegisterTable) -> Vec<String> {
        let lines = self.lines.push(chunk);
        for line in &lines {
            self.process_line(line, registers);
        }
        lines
    }

    /// Flushes a trailing unterminated line at end of stream.
    pub fn finish(&mut self, registers: &mut RegisterTable) -> Option<String> {
        let tail = self.lines.finish()?;
        self.process_line(&tail, registers);
        Some(tail)
    }

    pub fn process_line(&mut self, line: &str, registers: &mut RegisterTable) {
        match self.state {
            SectionState::Scanning => {
                if line.contains(config::REGISTER_SECTION_START) {
                    tracing::debug!("entering register section");
                    self.state = SectionState::InRegisterSection;
                }
            }
            SectionState::InRegisterSection => {
                if line.contains(config::REGISTER_SECTION_END) {
                    tracing::debug!("leaving register section");
                    self.state = SectionState::Finished;
                    return;
                }
                match parse_register_line(line) {
                    Some((name, value)) => {
                        registers.update(name, value);
                    }
                    None if line.contains(':') => {
                        tracing::trace!(line, "skipping malformed register line");
                    }
                    None => {}
                }
            }
            SectionState::Finished => {}
        }
    }
}

/// Splits a register-section line into `(name, hex value)`.
///
/// Accepts `PC: 0x0010 (16)` and `t0 (x0): 0x000F (15)`; the parenthesised
/// aliases are dropped.
pub fn parse_register_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("PC:") {
        let value = rest.split_whitespace().next()?;
        return Some(("PC", value));
    }

    let (reg_part, val_part) = line.split_once(':')?;
    let name = reg_part.split_whitespace().next()?;
    let value = val_part.split_whitespace().next()?;
    Some((name, value))
}

static ASSEMBLER_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error.*line\s+(\d+)").expect("assembler error pattern is valid")
});

/// Extracts the source line number from an assembler message such as
/// `Error on line 12: unknown register`.
pub fn assembler_error_line(line: &str) -> Option<usize> {
    ASSEMBLER_ERROR
        .captures(line)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}
