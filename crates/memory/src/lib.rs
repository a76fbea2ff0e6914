//! Detects allocation-discipline violations by combining the scope tree, the
//! source context, and the pattern registry (spec.md §4.4).

use serde::Deserialize;
use serde::Serialize;
use zignostic_context::ContextMap;
use zignostic_pattern::PatternConfig;
use zignostic_pattern::PatternRegistry;
use zignostic_pattern::PARAMETER_ALLOCATOR;
use zignostic_pattern::TEST_ALLOCATOR;
use zignostic_reporting::Diagnostic;
use zignostic_reporting::DiagnosticKind;
use zignostic_reporting::Severity;
use zignostic_scope::ScopeKind;
use zignostic_scope::ScopeNode;
use zignostic_scope::ScopeTracker;
use zignostic_scope::ScopeTrackerOptions;
use zignostic_scope::Variable;
use zignostic_span::Position;

/// User-facing configuration for the Memory Analyzer (spec.md §6 "memory" group).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub check_defer: bool,
    pub check_arena_usage: bool,
    pub check_allocator_usage: bool,
    pub check_ownership_transfer: bool,
    pub track_test_allocations: bool,
    pub max_scope_depth: usize,
    pub patterns: PatternConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            check_defer: true,
            check_arena_usage: true,
            check_allocator_usage: true,
            check_ownership_transfer: true,
            track_test_allocations: true,
            max_scope_depth: 256,
            patterns: PatternConfig::enabled(),
        }
    }
}

/// Runs the Memory Analyzer over `source`, labelling every diagnostic with
/// `file_path`. Diagnostics are returned in source order (spec.md §4.4
/// "Ordering").
#[must_use]
pub fn analyze(source: &str, file_path: &str, config: &MemoryConfig) -> Vec<Diagnostic> {
    let context = ContextMap::build(source);
    let registry = PatternRegistry::build(&config.patterns);
    let options = ScopeTrackerOptions {
        track_arena: config.check_arena_usage,
        track_defer: config.check_defer || config.check_arena_usage,
        max_depth: config.max_scope_depth.max(1),
    };
    let mut tracker = ScopeTracker::new(options);
    let lines: Vec<&str> = source.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        tracker.process_line(i + 1, line, &context, &registry);
    }
    tracker.finish(lines.len().max(1));

    let mut diagnostics = Vec::new();
    for node in tracker.nodes() {
        check_scope(node, tracker.nodes(), &context, &lines, &registry, config, file_path, &mut diagnostics);
    }
    for site in tracker.defer_in_loop_sites() {
        diagnostics.push(
            Diagnostic::new(
                file_path,
                Position::new(site.line, site.column),
                DiagnosticKind::DeferInLoop,
                Severity::Warning,
                format!("`{}` is released by a defer inside a loop; cleanup only runs at loop exit", site.variable),
            )
            .with_suggestion(format!("release `{}` at the end of each iteration instead of deferring it", site.variable)),
        );
    }
    for site in tracker.allocator_mismatch_sites() {
        diagnostics.push(
            Diagnostic::new(
                file_path,
                Position::new(site.line, site.column),
                DiagnosticKind::AllocatorMismatch,
                Severity::Error,
                format!(
                    "`{}` was allocated through `{}` but released through `{}`",
                    site.variable, site.original_allocator, site.free_allocator
                ),
            )
            .with_suggestion(format!("release `{}` through the same allocator it was allocated with", site.variable)),
        );
    }

    diagnostics.sort_by_key(|d| (d.line, d.column));
    diagnostics
}

#[allow(clippy::too_many_arguments)]
fn check_scope(
    node: &ScopeNode,
    all: &[ScopeNode],
    context: &ContextMap,
    lines: &[&str],
    registry: &PatternRegistry,
    config: &MemoryConfig,
    file_path: &str,
    out: &mut Vec<Diagnostic>,
) {
    let is_test_scope = node.kind == ScopeKind::TestFunction;
    let enclosing_function = enclosing_function_of(node, all);

    for var in &node.variables {
        if !var.is_allocation_site {
            continue;
        }
        // `allocator_source` is `None` when the allocator identifier matched no
        // pattern; that still names an allocation site these checks must cover
        // (spec.md §4.4 rule 1 and the §4.2 unclassified-allocator rule), using
        // `allocator_identity`'s raw identifier text to name the allocator.
        let allocator_display = var.allocator_source.as_deref().or(var.allocator_identity.as_deref());

        check_missing_defer(var, allocator_display, enclosing_function, registry, config, file_path, out);
        check_incorrect_allocator(var, var.allocator_source.as_deref(), allocator_display, is_test_scope, registry, config, file_path, out);
        check_missing_errdefer(node, var, context, lines, config, file_path, out);
    }

    if config.check_arena_usage {
        check_arena_in_library(node, file_path, out);
    }
}

fn enclosing_function_of<'a>(node: &'a ScopeNode, all: &'a [ScopeNode]) -> Option<&'a ScopeNode> {
    let mut current = Some(node);
    while let Some(n) = current {
        if n.kind.is_function() {
            return Some(n);
        }
        current = n.parent.map(|id| &all[id]);
    }
    None
}

/// `allocator_display` names the allocator in diagnostic text: the classified
/// `allocator_source`, or (when classification failed) the raw identifier
/// captured from `allocator_identity`. `None` only when neither is available.
#[allow(clippy::too_many_arguments)]
fn check_missing_defer(
    var: &Variable,
    allocator_display: Option<&str>,
    enclosing_function: Option<&ScopeNode>,
    registry: &PatternRegistry,
    config: &MemoryConfig,
    file_path: &str,
    out: &mut Vec<Diagnostic>,
) {
    if !config.check_defer {
        return;
    }
    if var.has_defer_cleanup || var.is_arena_allocated || var.ownership_transferred {
        return;
    }
    if config.check_ownership_transfer {
        if let Some(func) = enclosing_function {
            let return_type = func.return_type.as_deref().unwrap_or("");
            if registry.resolve_ownership(&func.name, return_type) {
                return;
            }
        }
    }
    let allocator_name = allocator_display.unwrap_or("an unclassified allocator");

    out.push(
        Diagnostic::new(
            file_path,
            Position::new(var.declaration_line, 1),
            DiagnosticKind::MissingDefer,
            Severity::Error,
            format!("`{}`, allocated via `{}`, is never released", var.name, allocator_name),
        )
        .with_suggestion(format!("add `defer {allocator_name}.free({})` after the allocation", var.name)),
    );
}

/// `allocator_source` is the classified allocator, used for the
/// parameter-allocator/test-allocator exemptions and the allow-list check;
/// `allocator_display` names the allocator (classified or raw) in diagnostic
/// text. An unclassified allocator (`allocator_source == None`) is never in
/// the allow list, so it always falls through to the diagnostic below.
#[allow(clippy::too_many_arguments)]
fn check_incorrect_allocator(
    var: &Variable,
    allocator_source: Option<&str>,
    allocator_display: Option<&str>,
    is_test_scope: bool,
    registry: &PatternRegistry,
    config: &MemoryConfig,
    file_path: &str,
    out: &mut Vec<Diagnostic>,
) {
    if !config.check_allocator_usage || registry.allowed_allocators().is_empty() {
        return;
    }
    if allocator_source == Some(PARAMETER_ALLOCATOR) {
        return;
    }
    if is_test_scope && config.track_test_allocations && allocator_source == Some(TEST_ALLOCATOR) {
        return;
    }
    if registry.is_allowed(allocator_source) {
        return;
    }
    let allocator_name = allocator_display.unwrap_or("an unclassified allocator");

    out.push(
        Diagnostic::new(
            file_path,
            Position::new(var.declaration_line, 1),
            DiagnosticKind::IncorrectAllocator,
            Severity::Warning,
            format!("`{}` uses `{}`, which is not in the allowed allocator list", var.name, allocator_name),
        )
        .with_suggestion(format!("use one of: {}", registry.allowed_allocators().join(", "))),
    );
}

#[allow(clippy::too_many_arguments)]
fn check_missing_errdefer(
    node: &ScopeNode,
    var: &Variable,
    context: &ContextMap,
    lines: &[&str],
    config: &MemoryConfig,
    file_path: &str,
    out: &mut Vec<Diagnostic>,
) {
    if !config.check_defer || !var.has_defer_cleanup || var.has_errdefer_cleanup || !var.ownership_transferred {
        return;
    }
    let Some(end_line) = node.end_line else { return };
    let fallible_after_declaration = (var.declaration_line + 1..=end_line).any(|line| line_has_try(context, lines, line));
    if !fallible_after_declaration {
        return;
    }

    out.push(
        Diagnostic::new(
            file_path,
            Position::new(var.declaration_line, 1),
            DiagnosticKind::MissingErrdefer,
            Severity::Warning,
            format!("`{}` is only released by `defer`; a fallible operation after it may leak on the error path", var.name),
        )
        .with_suggestion(format!(
            "release `{}` with `errdefer` as well, or restructure to free it before returning an error",
            var.name
        )),
    );
}

fn line_has_try(context: &ContextMap, lines: &[&str], line: usize) -> bool {
    let Some(text) = lines.get(line - 1) else { return false };
    let masked: String =
        text.bytes().enumerate().map(|(i, b)| if context.kind_at(line, i + 1).is_code() { b as char } else { ' ' }).collect();
    zignostic_scope::try_expr().is_match(&masked)
}

fn check_arena_in_library(node: &ScopeNode, file_path: &str, out: &mut Vec<Diagnostic>) {
    if node.kind != ScopeKind::Function {
        return;
    }
    for var in &node.variables {
        if !var.is_arena_struct || var.has_defer_cleanup {
            continue;
        }
        out.push(
            Diagnostic::new(
                file_path,
                Position::new(var.declaration_line, 1),
                DiagnosticKind::ArenaInLibrary,
                Severity::Warning,
                format!("`{}` is an arena allocator in a non-test function without a matching `deinit`", var.name),
            )
            .with_suggestion(format!("add `defer {}.deinit()` after creating the arena", var.name)),
        );
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    /// Core function every `test_memory_*!` macro below calls into, mirroring
    /// the teacher's own `run_lint_test` helper (crates/linter/src/rule/tests.rs).
    fn run_memory_test(code: &str, config: MemoryConfig) -> Vec<Diagnostic> {
        analyze(code, "f.zig", &config)
    }

    /// Asserts `code` produces no diagnostics under `MemoryConfig`, optionally
    /// overridden by `config`.
    macro_rules! test_memory_success {
        { name = $name:ident, code = $code:expr $(,)? } => {
            #[test]
            fn $name() {
                let found = run_memory_test($code, MemoryConfig::default());
                assert!(found.is_empty(), "expected no diagnostics, found {found:#?}");
            }
        };
        { name = $name:ident, config = $config:expr, code = $code:expr $(,)? } => {
            #[test]
            fn $name() {
                let found = run_memory_test($code, $config);
                assert!(found.is_empty(), "expected no diagnostics, found {found:#?}");
            }
        };
    }

    /// Asserts `code` produces at least one diagnostic of `kind`, optionally
    /// under a custom `config`.
    macro_rules! test_memory_failure {
        { name = $name:ident, kind = $kind:expr, code = $code:expr $(,)? } => {
            #[test]
            fn $name() {
                let found = run_memory_test($code, MemoryConfig::default());
                assert!(found.iter().any(|d| d.kind == $kind), "expected {:?} among {found:#?}", $kind);
            }
        };
        { name = $name:ident, kind = $kind:expr, config = $config:expr, code = $code:expr $(,)? } => {
            #[test]
            fn $name() {
                let found = run_memory_test($code, $config);
                assert!(found.iter().any(|d| d.kind == $kind), "expected {:?} among {found:#?}", $kind);
            }
        };
    }

    #[test]
    fn missing_defer_in_non_transferring_function() {
        let source = indoc! {"
            fn f(a: Allocator) void {
                const b = try a.alloc(u8, 16);
                doWork(b);
            }
        "};
        let found = run_memory_test(source, MemoryConfig::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, DiagnosticKind::MissingDefer);
        assert_eq!(found[0].severity, Severity::Error);
        assert_eq!(found[0].line, 2);
        assert_eq!(found[0].file_path, "f.zig");
    }

    test_memory_success! {
        name = ownership_transfer_exempts_missing_defer,
        code = indoc! {"
            fn create(a: Allocator) ![]u8 {
                return try a.alloc(u8, 16);
            }
        "}
    }

    test_memory_success! {
        name = arena_aliasing_exempts_missing_defer,
        code = indoc! {"
            fn f(a: Allocator) void {
                var arena = ArenaAllocator.init(a);
                defer arena.deinit();
                const alloc2 = arena.allocator();
                const b = try alloc2.alloc(u8, 16);
            }
        "}
    }

    #[test]
    fn incorrect_allocator_under_restrictive_allow_list() {
        let mut config = MemoryConfig::default();
        config.patterns.allowed_allocators.push("std.heap.GeneralPurposeAllocator".to_string());
        let source = indoc! {"
            fn f(a: Allocator) void {
                const b = try std.heap.page_allocator.alloc(u8, 16);
                defer std.heap.page_allocator.free(b);
            }
        "};
        let found: Vec<_> = run_memory_test(source, config).into_iter().map(|d| d.kind).collect();
        assert_eq!(found, vec![DiagnosticKind::IncorrectAllocator]);
    }

    test_memory_success! {
        name = comment_and_string_immunity,
        code = indoc! {r#"
            // const b = try a.alloc(u8, 1);
            const s = "try a.alloc(u8, 1)";
        "#}
    }

    test_memory_failure! {
        name = allocator_mismatch_detected,
        kind = DiagnosticKind::AllocatorMismatch,
        code = indoc! {"
            fn f(a: Allocator, other: Allocator) void {
                const b = try a.alloc(u8, 16);
                defer other.free(b);
            }
        "}
    }

    test_memory_failure! {
        name = defer_inside_loop_is_flagged,
        kind = DiagnosticKind::DeferInLoop,
        code = indoc! {"
            fn f(a: Allocator) void {
                while (true) {
                    const b = try a.alloc(u8, 16);
                    defer a.free(b);
                }
            }
        "}
    }

    test_memory_failure! {
        name = arena_in_library_without_deinit_is_flagged,
        kind = DiagnosticKind::ArenaInLibrary,
        code = indoc! {"
            fn f(a: Allocator) void {
                var arena = ArenaAllocator.init(a);
                const alloc2 = arena.allocator();
                const b = try alloc2.alloc(u8, 16);
            }
        "}
    }

    #[test]
    fn unclassified_allocator_still_flags_missing_defer() {
        let source = indoc! {"
            fn f() void {
                const b = try pool.alloc(u8, 16);
                doWork(b);
            }
        "};
        let found = run_memory_test(source, MemoryConfig::default());
        assert!(found.iter().any(|d| d.kind == DiagnosticKind::MissingDefer), "expected MissingDefer among {found:#?}");
        let diagnostic = found.iter().find(|d| d.kind == DiagnosticKind::MissingDefer).unwrap();
        assert!(diagnostic.message.contains("pool"), "message should name the raw allocator identifier: {diagnostic:#?}");
    }

    #[test]
    fn unclassified_allocator_is_flagged_under_an_allow_list() {
        let mut config = MemoryConfig::default();
        config.patterns.allowed_allocators.push("std.heap.GeneralPurposeAllocator".to_string());
        let source = indoc! {"
            fn f() void {
                const b = try pool.alloc(u8, 16);
                defer pool.free(b);
            }
        "};
        let found = run_memory_test(source, config);
        assert!(found.iter().any(|d| d.kind == DiagnosticKind::IncorrectAllocator), "expected IncorrectAllocator among {found:#?}");
    }

    test_memory_success! {
        name = test_allocator_always_allowed_inside_test_scope,
        config = {
            let mut config = MemoryConfig::default();
            config.patterns.allowed_allocators.push("std.heap.GeneralPurposeAllocator".to_string());
            config
        },
        code = indoc! {r#"
            test "unit: allocates and frees" {
                const b = try std.testing.allocator.alloc(u8, 16);
                defer std.testing.allocator.free(b);
            }
        "#}
    }

    #[test]
    fn diagnostics_are_ordered_by_position() {
        let source = indoc! {"
            fn f(a: Allocator) void {
                const b = try a.alloc(u8, 1);
                const c = try a.alloc(u8, 2);
            }
        "};
        let found = run_memory_test(source, MemoryConfig::default());
        let lines: Vec<usize> = found.iter().map(|d| d.line).collect();
        let mut sorted = lines.clone();
        sorted.sort_unstable();
        assert_eq!(lines, sorted);
    }
}
