use std::path::PathBuf;

/// Errors surfaced to callers of `analyze_file`/`analyze_source`.
///
/// I/O failures and allocator failures are surfaced here; malformed source is
/// never an error — it is reported as best-effort diagnostics instead.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum AnalysisError {
    /// A path-based entry point was given a path that does not exist.
    FileNotFound(PathBuf),
    /// The file exists but could not be read (permissions, locked, etc).
    AccessDenied(PathBuf),
    /// An allocation failed while constructing the result.
    OutOfMemory,
    /// Source was malformed badly enough that no diagnostics could be
    /// produced at all. Reserved for truly unrecoverable cases; pattern
    /// matching degrades gracefully in almost every other situation.
    ParseError(String),
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::FileNotFound(path) => write!(f, "file not found: {}", path.display()),
            AnalysisError::AccessDenied(path) => write!(f, "access denied: {}", path.display()),
            AnalysisError::OutOfMemory => write!(f, "out of memory"),
            AnalysisError::ParseError(message) => write!(f, "parse error: {message}"),
        }
    }
}

impl std::error::Error for AnalysisError {}
