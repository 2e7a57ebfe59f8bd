//! Text offset model.
//!
//! The rule engine works on byte offsets; editors work on line/character
//! positions. [`TextDocument`] is the read-only view of a host document the
//! core consumes, and [`SourceDocument`] is the in-memory implementation
//! used by the CLI and tests.
//!
//! Positions are zero-based. `character` counts Unicode scalar values from
//! the start of the line.

use serde::{Deserialize, Serialize};

/// A zero-based line/character position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open span between two positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Range covering whole lines `start_line..=end_line`.
    pub fn lines(start_line: u32, end_line: u32) -> Self {
        Self {
            start: Position::new(start_line, 0),
            end: Position::new(end_line, u32::MAX),
        }
    }
}

/// Read-only view of a host document.
pub trait TextDocument: Send + Sync {
    /// Document identifier (file path or editor URI).
    fn uri(&self) -> &str;

    /// Full document text.
    fn text(&self) -> &str;

    /// Convert a byte offset to a position. Out-of-range offsets clamp.
    fn position_at(&self, offset: usize) -> Position;

    /// Convert a position to a byte offset. Out-of-range positions clamp
    /// to the end of the line (or of the document).
    fn offset_at(&self, position: Position) -> usize;

    /// Number of lines (a trailing newline starts an empty last line).
    fn line_count(&self) -> usize;

    /// Text inside `range`.
    fn text_in(&self, range: Range) -> String {
        let mut start = self.offset_at(range.start);
        let mut end = self.offset_at(range.end);
        if start > end {
            std::mem::swap(&mut start, &mut end);
        }
        self.text()[start..end].to_string()
    }

    /// Text of line `line`, without its line terminator.
    fn line_text(&self, line: u32) -> String {
        let text = self.text_in(Range::new(Position::new(line, 0), Position::new(line, u32::MAX)));
        text.trim_end_matches('\r').to_string()
    }
}

/// In-memory document with precomputed line starts.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    uri: String,
    text: String,
    line_starts: Vec<usize>,
}

impl SourceDocument {
    pub fn new(uri: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            uri: uri.into(),
            text,
            line_starts,
        }
    }

    /// Byte span of `line` excluding the `\n` terminator.
    fn line_span(&self, line: usize) -> (usize, usize) {
        let start = self.line_starts[line];
        let end = match self.line_starts.get(line + 1) {
            Some(next) => next - 1,
            None => self.text.len(),
        };
        (start, end)
    }

    fn clamp_to_boundary(&self, offset: usize) -> usize {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }
}

impl TextDocument for SourceDocument {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn position_at(&self, offset: usize) -> Position {
        let offset = self.clamp_to_boundary(offset);
        let line = self.line_starts.partition_point(|&s| s <= offset) - 1;
        let line_start = self.line_starts[line];
        let character = self.text[line_start..offset].chars().count();
        Position::new(line as u32, character as u32)
    }

    fn offset_at(&self, position: Position) -> usize {
        let line = position.line as usize;
        if line >= self.line_starts.len() {
            return self.text.len();
        }
        let (start, end) = self.line_span(line);
        self.text[start..end]
            .char_indices()
            .nth(position.character as usize)
            .map(|(i, _)| start + i)
            .unwrap_or(end)
    }

    fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}
