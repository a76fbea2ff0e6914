//! Diagnostic reporting types for Zignostic.
//!
//! This crate provides the types handed back to callers of the analysis
//! entry points: [`Diagnostic`] describes a single issue, [`AnalysisResult`]
//! is the ordered collection plus run counters, and [`AnalysisError`] covers
//! the small set of failures that abort a whole analysis call.

use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::VariantNames;

use zignostic_span::Position;

pub mod error;

pub use error::AnalysisError;

/// The severity of a reported [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// The closed set of issue kinds this library can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, VariantNames)]
#[strum(serialize_all = "snake_case")]
pub enum DiagnosticKind {
    MissingDefer,
    MemoryLeak,
    DoubleFree,
    UseAfterFree,
    IncorrectAllocator,
    ArenaInLibrary,
    MissingErrdefer,
    DeferInLoop,
    OwnershipTransfer,
    AllocatorMismatch,
    MissingTestCategory,
    InvalidTestNaming,
    TestOutsideFile,
    MissingTestFile,
    OrphanedTest,
    MissingSourceFile,
    SourceWithoutTests,
    InvalidTestLocation,
    DuplicateTestName,
}

/// A single reported issue.
///
/// Every `String`/`Option<String>` field is independently owned — none of
/// them borrow from analyzer-internal state, so a `Diagnostic` can outlive
/// the analyzer that produced it with no lifetime ties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file_path: String,
    pub line: usize,
    pub column: usize,
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    pub suggestion: Option<String>,
    pub code_snippet: Option<String>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        file_path: impl Into<String>,
        position: Position,
        kind: DiagnosticKind,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            line: position.line,
            column: position.column,
            kind,
            severity,
            message: message.into(),
            suggestion: None,
            code_snippet: None,
        }
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    #[must_use]
    pub fn with_code_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.code_snippet = Some(snippet.into());
        self
    }

    #[must_use]
    pub const fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }
}

/// The result of a single `analyze_*` call: every diagnostic found, plus
/// run counters. Diagnostics are always in non-decreasing `(line, column)`
/// order within a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    diagnostics: Vec<Diagnostic>,
    pub files_analyzed: usize,
    pub analysis_time_ms: u64,
}

impl AnalysisResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    /// Truncates the diagnostic list to `max_issues`, unless `max_issues` is
    /// zero (unlimited).
    pub fn apply_max_issues(&mut self, max_issues: usize) {
        if max_issues != 0 && self.diagnostics.len() > max_issues {
            self.diagnostics.truncate(max_issues);
        }
    }

    /// Sorts diagnostics into the deterministic `(line, column)` order
    /// required by the public contract, preserving emission order for ties.
    pub fn sort_by_position(&mut self) {
        self.diagnostics.sort_by_key(|d| (d.line, d.column));
    }

    #[must_use]
    pub fn issues_found(&self) -> usize {
        self.diagnostics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.diagnostics.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl IntoIterator for AnalysisResult {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}

impl<'a> IntoIterator for &'a AnalysisResult {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.iter()
    }
}

impl Extend<Diagnostic> for AnalysisResult {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.diagnostics.extend(iter);
    }
}
