//! Zignostic: a static analysis library for Zig source code.
//!
//! Covers two domains: manual-memory-management hygiene (allocations without
//! matching release, allocator misuse, ownership transfer, arena misuse) and
//! test organization compliance (naming, categorization, file placement).
//! This crate wires the component crates (`zignostic-context`,
//! `zignostic-pattern`, `zignostic-scope`, `zignostic-memory`,
//! `zignostic-testing`) together behind the small external surface named in
//! spec.md §6. The CLI, the project-walk directory driver, the output
//! formatters, and build-integration helpers are deliberately out of scope
//! here; they consume `analyze_source`/`analyze_file` from elsewhere.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;

pub use zignostic_memory::MemoryConfig;
pub use zignostic_reporting::AnalysisError;
pub use zignostic_reporting::AnalysisResult;
pub use zignostic_reporting::Diagnostic;
pub use zignostic_reporting::DiagnosticKind;
pub use zignostic_reporting::Severity;
pub use zignostic_testing::TestingConfig;

/// The severity threshold below which a log event is dropped before
/// reaching the caller's `logging.callback` (spec.md §6 `logging.min_level`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A single event handed to the caller's logging callback.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
}

/// A caller-supplied logging sink, invoked synchronously on whichever thread
/// is running the analysis.
pub type LogCallback = Arc<dyn Fn(&LogEvent) + Send + Sync>;

/// Caller-supplied logging configuration (spec.md §6 "logging" group). The
/// callback is invoked synchronously, on whichever thread is running the
/// analysis; it must be thread-safe if the caller analyzes files concurrently
/// (spec.md §5 "Shared-resource policy").
#[derive(Clone, Default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub callback: Option<LogCallback>,
    pub min_level: Option<LogLevel>,
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("enabled", &self.enabled)
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .field("min_level", &self.min_level)
            .finish()
    }
}

impl LoggingConfig {
    fn emit(&self, level: LogLevel, message: impl Into<String>) {
        if !self.enabled {
            return;
        }
        let threshold = self.min_level.unwrap_or(LogLevel::Warn);
        if level < threshold {
            return;
        }
        if let Some(callback) = &self.callback {
            callback(&LogEvent { level, message: message.into() });
        }
    }
}

/// Non-analyzer-specific run options (spec.md §6 "options" group).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    pub max_issues: usize,
    pub verbose: bool,
    pub continue_on_error: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { max_issues: 0, verbose: false, continue_on_error: true }
    }
}

/// The full configuration record accepted by every `analyze_*` entry point
/// (spec.md §6). Logically immutable for the duration of one analysis call;
/// safe to share read-only across threads analyzing different files.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub memory: MemoryConfig,
    pub testing: TestingConfig,
    pub options: Options,
    pub logging: LoggingConfig,
}

/// Runs both analyzers over `source`, labelling diagnostics with
/// `file_path` (used only for the returned records; no file I/O happens
/// here). Pure function of `source` and `config`: identical inputs always
/// produce identical output (spec.md §8).
#[must_use]
pub fn analyze_source(source: &str, file_path: &str, config: &Configuration) -> AnalysisResult {
    let start = Instant::now();
    config.logging.emit(LogLevel::Debug, format!("analyzing {file_path}"));

    let mut result = AnalysisResult::new();
    result.extend(zignostic_memory::analyze(source, file_path, &config.memory));
    result.extend(zignostic_testing::analyze(source, file_path, &config.testing));
    result.sort_by_position();
    result.apply_max_issues(config.options.max_issues);
    result.files_analyzed = 1;
    result.analysis_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    config.logging.emit(LogLevel::Info, format!("{file_path}: {} issue(s) found", result.issues_found()));
    result
}

/// Runs only the Memory Analyzer over `source`.
#[must_use]
pub fn analyze_memory(source: &str, file_path: &str, config: &Configuration) -> AnalysisResult {
    let start = Instant::now();
    let mut result = AnalysisResult::new();
    result.extend(zignostic_memory::analyze(source, file_path, &config.memory));
    result.sort_by_position();
    result.apply_max_issues(config.options.max_issues);
    result.files_analyzed = 1;
    result.analysis_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    result
}

/// Runs only the Testing Analyzer over `source`.
#[must_use]
pub fn analyze_tests(source: &str, file_path: &str, config: &Configuration) -> AnalysisResult {
    let start = Instant::now();
    let mut result = AnalysisResult::new();
    result.extend(zignostic_testing::analyze(source, file_path, &config.testing));
    result.sort_by_position();
    result.apply_max_issues(config.options.max_issues);
    result.files_analyzed = 1;
    result.analysis_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    result
}

/// Reads `path` and runs [`analyze_source`] over its contents, labelling
/// diagnostics with `path` rendered as a string (spec.md §6 "analyze_file").
pub fn analyze_file(path: &Path, config: &Configuration) -> Result<AnalysisResult, AnalysisError> {
    let source = read_file(path, config)?;
    let file_path = path.to_string_lossy();
    Ok(analyze_source(&source, &file_path, config))
}

fn read_file(path: &Path, config: &Configuration) -> Result<String, AnalysisError> {
    match fs::read_to_string(path) {
        Ok(source) => Ok(source),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            config.logging.emit(LogLevel::Error, format!("file not found: {}", path.display()));
            Err(AnalysisError::FileNotFound(path.to_path_buf()))
        }
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            config.logging.emit(LogLevel::Error, format!("access denied: {}", path.display()));
            Err(AnalysisError::AccessDenied(path.to_path_buf()))
        }
        Err(err) => {
            config.logging.emit(LogLevel::Error, format!("failed to read {}: {err}", path.display()));
            Err(AnalysisError::AccessDenied(path.to_path_buf()))
        }
    }
}

/// Releases `result`. In Rust, ownership and `Drop` already free every
/// `String` field and the backing `Vec<Diagnostic>` when `result` goes out
/// of scope; this function exists purely so callers translating the
/// documented acquire/release lifecycle (spec.md §3, §6) keep a visible,
/// named call site. It performs no work beyond the implicit drop.
pub fn free_result(result: AnalysisResult) {
    drop(result);
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use indoc::indoc;

    use super::*;

    #[test]
    fn analyze_source_runs_both_analyzers() {
        let source = indoc! {"
            fn f(a: Allocator) void {
                const b = try a.alloc(u8, 16);
                doWork(b);
            }

            test \"hello\" {
                try std.testing.expect(true);
            }
        "};
        let result = analyze_source(source, "f.zig", &Configuration::default());
        let kinds: Vec<_> = result.iter().map(|d| d.kind).collect();
        assert!(kinds.contains(&DiagnosticKind::MissingDefer));
        assert!(kinds.contains(&DiagnosticKind::MissingTestCategory));
    }

    #[test]
    fn empty_source_yields_empty_result() {
        let result = analyze_source("", "empty.zig", &Configuration::default());
        assert!(result.is_empty());
        assert_eq!(result.files_analyzed, 1);
    }

    #[test]
    fn analysis_is_pure_given_same_source_and_config() {
        let source = "fn f(a: Allocator) void {\n    const b = try a.alloc(u8, 16);\n}\n";
        let config = Configuration::default();
        let first: Vec<_> = analyze_source(source, "f.zig", &config).into_vec();
        let second: Vec<_> = analyze_source(source, "f.zig", &config).into_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn max_issues_caps_the_result() {
        let source = indoc! {"
            fn f(a: Allocator) void {
                const b = try a.alloc(u8, 1);
                const c = try a.alloc(u8, 2);
                const d = try a.alloc(u8, 3);
            }
        "};
        let mut config = Configuration::default();
        config.options.max_issues = 1;
        let result = analyze_source(source, "f.zig", &config);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn analyze_file_reports_file_not_found() {
        let config = Configuration::default();
        let err = analyze_file(Path::new("/nonexistent/path/to/file.zig"), &config).unwrap_err();
        assert!(matches!(err, AnalysisError::FileNotFound(_)));
    }

    #[test]
    fn analyze_memory_only_runs_the_memory_analyzer() {
        let source = indoc! {"
            test \"hello\" {
                try std.testing.expect(true);
            }
        "};
        let result = analyze_memory(source, "f.zig", &Configuration::default());
        assert!(result.is_empty());
    }

    #[test]
    fn analyze_tests_only_runs_the_testing_analyzer() {
        let source = indoc! {"
            fn f(a: Allocator) void {
                const b = try a.alloc(u8, 16);
            }
        "};
        let result = analyze_tests(source, "f.zig", &Configuration::default());
        assert!(result.is_empty());
    }

    #[test]
    fn logging_callback_receives_events_above_min_level() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let mut config = Configuration::default();
        config.logging.enabled = true;
        config.logging.min_level = Some(LogLevel::Info);
        config.logging.callback = Some(Arc::new(move |event: &LogEvent| {
            sink.lock().expect("log sink mutex is never poisoned").push(event.message.clone());
        }));

        let _ = analyze_source("", "f.zig", &config);

        let captured = events.lock().expect("log sink mutex is never poisoned");
        assert!(captured.iter().any(|m| m.contains("issue(s) found")));
        assert!(!captured.iter().any(|m| m.contains("analyzing")));
    }

    #[test]
    fn free_result_drops_without_panicking() {
        let result = analyze_source("fn f() void {}\n", "f.zig", &Configuration::default());
        free_result(result);
    }

    #[test]
    fn memory_and_testing_config_round_trip_through_json() {
        let mut config = Configuration::default();
        config.memory.check_arena_usage = false;
        config.testing.test_file_suffix = "_spec".to_string();

        let memory_json = serde_json::to_string(&config.memory).expect("MemoryConfig serializes");
        let testing_json = serde_json::to_string(&config.testing).expect("TestingConfig serializes");

        let memory: MemoryConfig = serde_json::from_str(&memory_json).expect("MemoryConfig deserializes");
        let testing: TestingConfig = serde_json::from_str(&testing_json).expect("TestingConfig deserializes");

        assert!(!memory.check_arena_usage);
        assert_eq!(testing.test_file_suffix, "_spec");
    }
}
