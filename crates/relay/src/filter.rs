//! Transcript filtering
//!
//! Turns raw chunks of relayed traffic into transcript blocks. Chunks are
//! split on `\n` with no buffering across calls, so a line that straddles two
//! reads is recorded as two lines.
//!
//! Lines that only carry transport framing (`Content-Length: 123`,
//! `Content-Type: ...`) are dropped so the transcript shows message bodies.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static CONTENT_LENGTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Content-Length: [0-9]+").expect("valid Content-Length pattern"));
// `\r` is not part of the value, so a bare `Content-Type: \r` is not framing
static CONTENT_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Content-Type: [^\r\n]+").expect("valid Content-Type pattern"));

/// Marker prefixed to every line of child stderr
pub const STDERR_MARKER: &str = "E ";

/// Which way a chunk travelled through the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Parent stdin into the child
    ToChild,
    /// Child stdout back to the parent
    FromChild,
}

impl Direction {
    pub fn marker(self) -> &'static str {
        match self {
            Direction::ToChild => "🔼",
            Direction::FromChild => "🔻",
        }
    }
}

/// A line that survived filtering, tagged with its direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptLine<'a> {
    direction: Direction,
    content: &'a str,
}

impl<'a> TranscriptLine<'a> {
    /// `None` for blank lines and framing headers
    pub fn new(direction: Direction, content: &'a str) -> Option<Self> {
        if content.chars().all(is_blank_char) || is_framing_header(content) {
            return None;
        }
        Some(Self { direction, content })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn content(&self) -> &'a str {
        self.content
    }
}

impl fmt::Display for TranscriptLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.direction.marker(), self.content)
    }
}

/// Whether `line` carries transport framing and is left out of the
/// transcript. Either header may appear anywhere in the line.
pub fn is_framing_header(line: &str) -> bool {
    CONTENT_LENGTH.is_match(line) || CONTENT_TYPE.is_match(line)
}

/// Surviving lines of `text`, in order.
///
/// `text` is split on `\n` only. A trailing `\r` stays on its line, and a
/// line made of nothing but whitespace is dropped.
pub fn transcript_lines(direction: Direction, text: &str) -> impl Iterator<Item = TranscriptLine<'_>> {
    text.split('\n')
        .filter_map(move |line| TranscriptLine::new(direction, line))
}

/// Unicode whitespace plus the byte order mark, minus NEL (U+0085)
fn is_blank_char(c: char) -> bool {
    (c.is_whitespace() && c != '\u{85}') || c == '\u{FEFF}'
}

/// Render one chunk as a transcript block ending in `\n`.
///
/// Returns `None` when nothing in the chunk survives, in which case nothing
/// should be written.
pub fn render_chunk(direction: Direction, chunk: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(chunk);
    let mut block = String::new();
    for line in transcript_lines(direction, &text) {
        if !block.is_empty() {
            block.push('\n');
        }
        block.push_str(&line.to_string());
    }

    if block.is_empty() {
        None
    } else {
        block.push('\n');
        Some(block)
    }
}

/// Render a chunk of child stderr: marker, raw bytes, newline
pub fn render_stderr(chunk: &[u8]) -> Vec<u8> {
    let mut block = Vec::with_capacity(STDERR_MARKER.len() + chunk.len() + 1);
    block.extend_from_slice(STDERR_MARKER.as_bytes());
    block.extend_from_slice(chunk);
    block.push(b'\n');
    block
}
