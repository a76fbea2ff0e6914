//! Classifies every byte of a Zig source file as code or one of several
//! kinds of non-code region (comment, string literal, character literal,
//! `@embedFile` argument), so that pattern-matching analyzers elsewhere in
//! Zignostic can ignore commented-out or quoted text.
//!
//! The classifier is built once per file by a single forward scan over the
//! bytes, then answers per-`(line, column)` queries in O(1) via a per-line
//! bitmap, matching the caching strategy spec.md §4.1 allows.
//!
//! The classifier never fails: malformed input (an unterminated string, an
//! unmatched block comment) yields a best-effort classification rather than
//! an error.

/// The classification of a single byte position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Code,
    LineComment,
    DocComment,
    BlockComment,
    StringRegular,
    StringMultiline,
    StringRaw,
    CharLiteral,
    EmbedFileArg,
}

impl ContextKind {
    #[must_use]
    pub const fn is_comment(self) -> bool {
        matches!(self, Self::LineComment | Self::DocComment | Self::BlockComment)
    }

    #[must_use]
    pub const fn is_string(self) -> bool {
        matches!(self, Self::StringRegular | Self::StringMultiline | Self::StringRaw | Self::EmbedFileArg)
    }

    #[must_use]
    pub const fn is_code(self) -> bool {
        matches!(self, Self::Code)
    }
}

/// Internal scan state. Not exposed: callers only ever see [`ContextKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Code,
    LineComment,
    DocComment,
    BlockComment,
    StringRegular,
    StringRaw(u8),
    CharLiteral,
}

/// A cap on character-literal length, in bytes, past which a malformed
/// literal is force-closed rather than left open indefinitely.
const CHAR_LITERAL_CAP: usize = 10;

/// A side table answering, for any `(line, column)`, the [`ContextKind`] of
/// that byte. Built once per file, discarded at the end of analysis.
#[derive(Debug, Clone, Default)]
pub struct ContextMap {
    /// `lines[line - 1][column - 1]` is the context kind of that byte.
    lines: Vec<Vec<ContextKind>>,
}

impl ContextMap {
    /// Runs the forward scan described in spec.md §4.1 over `source`.
    #[must_use]
    pub fn build(source: &str) -> Self {
        let bytes = source.as_bytes();
        let mut lines: Vec<Vec<ContextKind>> = Vec::new();
        let mut current_line: Vec<ContextKind> = Vec::new();
        let mut state = ScanState::Code;
        let mut pending_embed_arg = false;
        let mut embed_string_mode = false;
        let mut char_literal_start = 0usize;
        let mut idx = 0usize;

        while idx < bytes.len() {
            let b = bytes[idx];

            // Multiline string detection is a per-line, start-of-line
            // pattern: only tried when we're in `Code` state at column 1.
            if state == ScanState::Code && current_line.is_empty() {
                let mut lookahead = idx;
                while lookahead < bytes.len() && (bytes[lookahead] == b' ' || bytes[lookahead] == b'\t') {
                    lookahead += 1;
                }
                if bytes[lookahead..].starts_with(b"\\\\") {
                    for _ in idx..lookahead {
                        current_line.push(ContextKind::Code);
                    }
                    idx = lookahead;
                    while idx < bytes.len() && bytes[idx] != b'\n' {
                        current_line.push(ContextKind::StringMultiline);
                        idx += 1;
                    }
                    continue;
                }
            }

            if b == b'\n' {
                match state {
                    ScanState::LineComment | ScanState::DocComment | ScanState::StringRegular => {
                        state = ScanState::Code;
                    }
                    ScanState::CharLiteral => {
                        // Malformed: an unterminated char literal at EOL. Best effort: close it.
                        state = ScanState::Code;
                    }
                    ScanState::BlockComment | ScanState::StringRaw(_) | ScanState::Code => {}
                }
                lines.push(std::mem::take(&mut current_line));
                idx += 1;
                continue;
            }

            match state {
                ScanState::Code => {
                    if b == b'/' && bytes.get(idx + 1) == Some(&b'/') {
                        let (kind, consumed) = if matches!(bytes.get(idx + 2), Some(&b'/') | Some(&b'!')) {
                            (ContextKind::DocComment, 3)
                        } else {
                            (ContextKind::LineComment, 2)
                        };
                        state = if kind == ContextKind::DocComment { ScanState::DocComment } else { ScanState::LineComment };
                        for _ in 0..consumed {
                            current_line.push(kind);
                        }
                        idx += consumed;
                        continue;
                    }

                    if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                        state = ScanState::BlockComment;
                        current_line.push(ContextKind::BlockComment);
                        current_line.push(ContextKind::BlockComment);
                        idx += 2;
                        continue;
                    }

                    if b == b'@' && bytes[idx..].starts_with(b"@embedFile") {
                        let len = "@embedFile".len();
                        for _ in 0..len {
                            current_line.push(ContextKind::Code);
                        }
                        idx += len;
                        pending_embed_arg = true;
                        continue;
                    }

                    if b == b'r' {
                        let mut depth = 0u8;
                        let mut probe = idx + 1;
                        while bytes.get(probe) == Some(&b'#') {
                            depth += 1;
                            probe += 1;
                        }
                        if bytes.get(probe) == Some(&b'"') {
                            state = ScanState::StringRaw(depth);
                            let opener_len = probe + 1 - idx;
                            for _ in 0..opener_len {
                                current_line.push(ContextKind::StringRaw);
                            }
                            idx += opener_len;
                            continue;
                        }
                    }

                    if b == b'"' {
                        let kind = if pending_embed_arg { ContextKind::EmbedFileArg } else { ContextKind::StringRegular };
                        pending_embed_arg = false;
                        embed_string_mode = kind == ContextKind::EmbedFileArg;
                        state = ScanState::StringRegular;
                        current_line.push(kind);
                        idx += 1;
                        continue;
                    }

                    if b == b'\'' {
                        state = ScanState::CharLiteral;
                        char_literal_start = current_line.len();
                        current_line.push(ContextKind::CharLiteral);
                        idx += 1;
                        continue;
                    }

                    current_line.push(ContextKind::Code);
                    idx += 1;
                }
                ScanState::LineComment => {
                    current_line.push(ContextKind::LineComment);
                    idx += 1;
                }
                ScanState::DocComment => {
                    current_line.push(ContextKind::DocComment);
                    idx += 1;
                }
                ScanState::BlockComment => {
                    if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                        current_line.push(ContextKind::BlockComment);
                        current_line.push(ContextKind::BlockComment);
                        idx += 2;
                        state = ScanState::Code;
                        continue;
                    }
                    current_line.push(ContextKind::BlockComment);
                    idx += 1;
                }
                ScanState::StringRegular => {
                    let kind = if embed_string_mode { ContextKind::EmbedFileArg } else { ContextKind::StringRegular };
                    if b == b'\\' && bytes.get(idx + 1).is_some() {
                        current_line.push(kind);
                        current_line.push(kind);
                        idx += 2;
                        continue;
                    }
                    current_line.push(kind);
                    idx += 1;
                    if b == b'"' {
                        state = ScanState::Code;
                        embed_string_mode = false;
                    }
                }
                ScanState::StringRaw(depth) => {
                    if b == b'"' {
                        let mut hashes = 0u8;
                        while bytes.get(idx + 1 + hashes as usize) == Some(&b'#') {
                            hashes += 1;
                        }
                        if hashes == depth {
                            let closer_len = 1 + depth as usize;
                            for _ in 0..closer_len {
                                current_line.push(ContextKind::StringRaw);
                            }
                            idx += closer_len;
                            state = ScanState::Code;
                            continue;
                        }
                    }
                    current_line.push(ContextKind::StringRaw);
                    idx += 1;
                }
                ScanState::CharLiteral => {
                    if b == b'\\' && bytes.get(idx + 1).is_some() {
                        current_line.push(ContextKind::CharLiteral);
                        current_line.push(ContextKind::CharLiteral);
                        idx += 2;
                        continue;
                    }
                    current_line.push(ContextKind::CharLiteral);
                    idx += 1;
                    if b == b'\'' || current_line.len() - char_literal_start >= CHAR_LITERAL_CAP {
                        state = ScanState::Code;
                    }
                }
            }
        }

        lines.push(current_line);
        Self { lines }
    }

    /// The classification of `(line, column)`, both 1-indexed. Positions
    /// outside the file are reported as [`ContextKind::Code`].
    #[must_use]
    pub fn kind_at(&self, line: usize, column: usize) -> ContextKind {
        self.lines
            .get(line.saturating_sub(1))
            .and_then(|l| l.get(column.saturating_sub(1)))
            .copied()
            .unwrap_or(ContextKind::Code)
    }

    #[must_use]
    pub fn is_in_comment(&self, line: usize, column: usize) -> bool {
        self.kind_at(line, column).is_comment()
    }

    #[must_use]
    pub fn is_in_string(&self, line: usize, column: usize) -> bool {
        self.kind_at(line, column).is_string()
    }

    /// A fast pre-filter: `true` if every byte on `line` is code. Lines past
    /// EOF report `true` (nothing to skip).
    #[must_use]
    pub fn line_is_entirely_code(&self, line: usize) -> bool {
        self.lines.get(line.saturating_sub(1)).is_none_or(|l| l.iter().all(|k| k.is_code()))
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}
