//! Source position and span primitives.
//!
//! Every other Zignostic crate builds on [`Position`] to describe where in a
//! file something was found. Lines and columns are both 1-indexed; a column
//! is a byte offset within the line, not a codepoint index.

use serde::Deserialize;
use serde::Serialize;

/// A `(line, column)` pair, both 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A range between two [`Position`]s, inclusive of `start`, exclusive of `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A zero-width span at a single position, used for line-level detections
    /// that have no meaningful end column.
    #[must_use]
    pub const fn at(position: Position) -> Self {
        Self { start: position, end: position }
    }

    #[must_use]
    pub const fn contains_line(&self, line: usize) -> bool {
        self.start.line <= line && line <= self.end.line
    }
}
