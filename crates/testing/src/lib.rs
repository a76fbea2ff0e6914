//! Detects test-declaration hygiene issues: naming, categorization, and file
//! placement (spec.md §4.5).

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use zignostic_context::ContextMap;
use zignostic_reporting::Diagnostic;
use zignostic_reporting::DiagnosticKind;
use zignostic_reporting::Severity;
use zignostic_span::Position;

/// User-facing configuration for the Testing Analyzer (spec.md §6 "testing" group).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestingConfig {
    pub enforce_categories: bool,
    pub enforce_naming: bool,
    pub enforce_test_files: bool,
    pub allowed_categories: Vec<String>,
    pub test_file_suffix: String,
}

impl Default for TestingConfig {
    fn default() -> Self {
        Self {
            enforce_categories: true,
            enforce_naming: true,
            enforce_test_files: true,
            allowed_categories: vec![
                "unit".to_string(),
                "integration".to_string(),
                "e2e".to_string(),
                "performance".to_string(),
                "stress".to_string(),
            ],
            test_file_suffix: "_test".to_string(),
        }
    }
}

fn test_decl() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r#"^\s*test\s*"([^"]*)"\s*\{"#).expect("static pattern is valid regex"))
}

struct TestDeclaration {
    line: usize,
    name: String,
}

/// A file-scope scan for `test "NAME" { ... }` declarations, masking
/// commented-out or quoted occurrences via the context classifier.
fn find_test_declarations(source: &str, context: &ContextMap) -> Vec<TestDeclaration> {
    let mut declarations = Vec::new();
    for (i, line) in source.lines().enumerate() {
        let line_no = i + 1;
        // Blank out comment bytes only, so a real `test "..."` declaration's
        // own quote characters (classified as string context) still match,
        // while a commented-out occurrence does not.
        let masked: String = line
            .bytes()
            .enumerate()
            .map(|(col, b)| if context.kind_at(line_no, col + 1).is_comment() { b' ' } else { b })
            .map(|b| b as char)
            .collect();
        if let Some(caps) = test_decl().captures(&masked) {
            declarations.push(TestDeclaration { line: line_no, name: caps[1].to_string() });
        }
    }
    declarations
}

/// Splits a test name into its optional category (the text before the first
/// `:`, trimmed) and the remainder (spec.md §4.5 "Recognition").
fn split_category(name: &str) -> Option<(&str, &str)> {
    let (category, rest) = name.split_once(':')?;
    Some((category.trim(), rest.trim()))
}

/// Runs the Testing Analyzer over `source`, labelling every diagnostic with
/// `file_path`.
#[must_use]
pub fn analyze(source: &str, file_path: &str, config: &TestingConfig) -> Vec<Diagnostic> {
    let context = ContextMap::build(source);
    let declarations = find_test_declarations(source, &context);

    let mut diagnostics = Vec::new();
    let mut seen_names: HashSet<&str> = HashSet::new();
    let is_test_file = std::path::Path::new(file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|stem| stem.ends_with(config.test_file_suffix.as_str()));

    for decl in &declarations {
        if !seen_names.insert(decl.name.as_str()) {
            diagnostics.push(
                Diagnostic::new(
                    file_path,
                    Position::new(decl.line, 1),
                    DiagnosticKind::DuplicateTestName,
                    Severity::Error,
                    format!("test name \"{}\" is declared more than once in this file", decl.name),
                )
                .with_suggestion("give each test in a file a unique name".to_string()),
            );
        }

        let category = split_category(&decl.name);

        if config.enforce_categories && category.is_none() {
            diagnostics.push(
                Diagnostic::new(
                    file_path,
                    Position::new(decl.line, 1),
                    DiagnosticKind::MissingTestCategory,
                    Severity::Warning,
                    format!("test \"{}\" has no category prefix", decl.name),
                )
                .with_suggestion(format!("name it \"category: {}\", e.g. \"unit: {}\"", decl.name, decl.name)),
            );
        } else if let Some((category_name, rest)) = category {
            if config.enforce_categories && !config.allowed_categories.iter().any(|c| c == category_name) {
                diagnostics.push(
                    Diagnostic::new(
                        file_path,
                        Position::new(decl.line, 1),
                        DiagnosticKind::MissingTestCategory,
                        Severity::Warning,
                        format!("test category \"{category_name}\" is not one of the allowed categories"),
                    )
                    .with_suggestion(format!("use one of: {}", config.allowed_categories.join(", "))),
                );
            }
            if config.enforce_naming && (rest.is_empty() || rest.contains(':')) {
                diagnostics.push(
                    Diagnostic::new(
                        file_path,
                        Position::new(decl.line, 1),
                        DiagnosticKind::InvalidTestNaming,
                        Severity::Warning,
                        format!("test \"{}\" does not follow the \"category: description\" form", decl.name),
                    )
                    .with_suggestion("use a single colon after the category, e.g. \"unit: parses empty input\"".to_string()),
                );
            }
        }

        if config.enforce_test_files && !is_test_file {
            diagnostics.push(
                Diagnostic::new(
                    file_path,
                    Position::new(decl.line, 1),
                    DiagnosticKind::InvalidTestLocation,
                    Severity::Error,
                    format!("test \"{}\" is declared in a file that does not end with \"{}\"", decl.name, config.test_file_suffix),
                )
                .with_suggestion(format!("move this test into a file ending with \"{}\"", config.test_file_suffix)),
            );
        }
    }

    diagnostics.sort_by_key(|d| (d.line, d.column));
    diagnostics
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    /// Core function every `test_testing_*!` macro below calls into, mirroring
    /// the teacher's own `run_lint_test` helper (crates/linter/src/rule/tests.rs).
    fn run_testing_test(code: &str, file_path: &str, config: &TestingConfig) -> Vec<Diagnostic> {
        analyze(code, file_path, config)
    }

    /// Asserts `code`, analyzed as `file_path`, produces no diagnostics.
    macro_rules! test_testing_success {
        { name = $name:ident, file = $file:expr, code = $code:expr $(,)? } => {
            #[test]
            fn $name() {
                let found = run_testing_test($code, $file, &TestingConfig::default());
                assert!(found.is_empty(), "expected no diagnostics, found {found:#?}");
            }
        };
    }

    /// Asserts `code`, analyzed as `file_path`, produces at least one
    /// diagnostic of `kind`.
    macro_rules! test_testing_failure {
        { name = $name:ident, kind = $kind:expr, file = $file:expr, code = $code:expr $(,)? } => {
            #[test]
            fn $name() {
                let found = run_testing_test($code, $file, &TestingConfig::default());
                assert!(found.iter().any(|d| d.kind == $kind), "expected {:?} among {found:#?}", $kind);
            }
        };
    }

    test_testing_failure! {
        name = missing_category_is_flagged,
        kind = DiagnosticKind::MissingTestCategory,
        file = "basic_test.zig",
        code = indoc! {r#"
            test "hello" {
                try std.testing.expect(true);
            }
        "#}
    }

    test_testing_success! {
        name = well_formed_unit_test_is_clean,
        file = "parser_test.zig",
        code = indoc! {r#"
            test "unit: parses empty input" {
                try std.testing.expect(true);
            }
        "#}
    }

    test_testing_failure! {
        name = disallowed_category_is_flagged,
        kind = DiagnosticKind::MissingTestCategory,
        file = "basic_test.zig",
        code = indoc! {r#"
            test "smoke: quick check" {
                try std.testing.expect(true);
            }
        "#}
    }

    test_testing_failure! {
        name = second_colon_is_invalid_naming,
        kind = DiagnosticKind::InvalidTestNaming,
        file = "basic_test.zig",
        code = indoc! {r#"
            test "unit: parses: empty input" {
                try std.testing.expect(true);
            }
        "#}
    }

    test_testing_failure! {
        name = file_without_test_suffix_is_flagged,
        kind = DiagnosticKind::InvalidTestLocation,
        file = "basic.zig",
        code = indoc! {r#"
            test "unit: parses empty input" {
                try std.testing.expect(true);
            }
        "#}
    }

    test_testing_failure! {
        name = duplicate_test_names_are_flagged,
        kind = DiagnosticKind::DuplicateTestName,
        file = "basic_test.zig",
        code = indoc! {r#"
            test "unit: first" {
                try std.testing.expect(true);
            }
            test "unit: first" {
                try std.testing.expect(true);
            }
        "#}
    }

    test_testing_success! {
        name = commented_out_test_declaration_is_ignored,
        file = "basic_test.zig",
        code = indoc! {r#"
            // test "hello" {
            //     try std.testing.expect(true);
            // }
        "#}
    }
}
