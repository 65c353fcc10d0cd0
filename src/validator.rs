use std::fmt;

use crate::classifier::classify;

/// One physical line of the editor buffer.
#[derive(Debug, PartialEq)]
pub struct SourceLine<'a> {
    /// 1-based number in the original text.
    pub number: usize,
    pub raw: &'a str,
    /// Text before the first `#`, trimmed.
    pub content: &'a str,
}

impl<'a> SourceLine<'a> {
    pub fn new(number: usize, raw: &'a str) -> Self {
        let code = raw.split('#').next().unwrap_or_default();
        SourceLine {
            number,
            raw,
            content: code.trim(),
        }
    }
}

pub fn source_lines(source: &str) -> impl Iterator<Item = SourceLine<'_>> {
    source
        .lines()
        .enumerate()
        .map(|(i, raw)| SourceLine::new(i + 1, raw))
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Diagnostic {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)
    }
}

/// Checks every line of `source` and collects a diagnostic for each line
/// whose leading token is unknown. Diagnostics come out in source order.
pub fn validate(source: &str) -> Vec<Diagnostic> {
    source_lines(source)
        .filter(|line| !classify(line.content).is_valid())
        .inspect(|line| tracing::trace!(line = line.number, raw = line.raw, "invalid instruction"))
        .map(|line| Diagnostic {
            line: line.number,
            message: format!("Invalid instruction: {}", line.content),
        })
        .collect()
}
