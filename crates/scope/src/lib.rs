//! A line-driven hierarchical scope tracker.
//!
//! Builds a per-file scope tree and variable tables in one forward pass over
//! the source (spec.md §4.3). Scopes nest strictly (LIFO); variable lookup
//! walks from the current scope outward, so inner declarations shadow outer
//! ones of the same name.

mod node;
mod patterns;

pub use node::ScopeId;
pub use node::ScopeKind;
pub use node::ScopeNode;
pub use node::Variable;
pub use patterns::try_expr;

use zignostic_context::ContextMap;
use zignostic_pattern::PatternRegistry;
use zignostic_pattern::PARAMETER_ALLOCATOR;

/// Tuning knobs for the tracker (spec.md §4.3 "State").
#[derive(Debug, Clone, Copy)]
pub struct ScopeTrackerOptions {
    pub track_arena: bool,
    pub track_defer: bool,
    pub max_depth: usize,
}

impl Default for ScopeTrackerOptions {
    fn default() -> Self {
        Self { track_arena: true, track_defer: true, max_depth: 256 }
    }
}

struct PendingSignature {
    name: String,
    buffer: String,
    start_line: usize,
}

/// A `defer`/`errdefer` recognized inside a loop scope (spec.md §4.4 rule 6).
#[derive(Debug, Clone)]
pub struct LoopDeferSite {
    pub line: usize,
    pub column: usize,
    pub variable: String,
}

/// A release through an allocator handle whose canonical name differs from
/// the released variable's originating allocator (spec.md §4.4 rule 7).
#[derive(Debug, Clone)]
pub struct MismatchSite {
    pub line: usize,
    pub column: usize,
    pub variable: String,
    pub free_allocator: String,
    pub original_allocator: String,
}

/// Builds the scope forest for one file, one line at a time.
pub struct ScopeTracker {
    options: ScopeTrackerOptions,
    nodes: Vec<ScopeNode>,
    stack: Vec<ScopeId>,
    /// Depth of scope opens suppressed by `max_depth`, so the matching
    /// closes can be suppressed too without touching the real stack.
    suppressed_depth: usize,
    pending_signature: Option<PendingSignature>,
    defer_in_loop_sites: Vec<LoopDeferSite>,
    allocator_mismatch_sites: Vec<MismatchSite>,
}

impl ScopeTracker {
    #[must_use]
    pub fn new(options: ScopeTrackerOptions) -> Self {
        let root = ScopeNode {
            id: 0,
            kind: ScopeKind::Block,
            name: String::new(),
            start_line: 1,
            end_line: None,
            parent: None,
            children: Vec::new(),
            variables: Vec::new(),
            return_type: None,
        };
        Self {
            options,
            nodes: vec![root],
            stack: vec![0],
            suppressed_depth: 0,
            pending_signature: None,
            defer_in_loop_sites: Vec::new(),
            allocator_mismatch_sites: Vec::new(),
        }
    }

    #[must_use]
    pub fn defer_in_loop_sites(&self) -> &[LoopDeferSite] {
        &self.defer_in_loop_sites
    }

    #[must_use]
    pub fn allocator_mismatch_sites(&self) -> &[MismatchSite] {
        &self.allocator_mismatch_sites
    }

    /// Restores the tracker to a freshly-constructed state, releasing every
    /// scope and variable name so a single instance can analyze many files
    /// in sequence (spec.md §4.3 "Reuse").
    pub fn reset(&mut self) {
        *self = Self::new(self.options);
    }

    #[must_use]
    pub fn current_scope_id(&self) -> ScopeId {
        *self.stack.last().expect("root scope is never popped")
    }

    #[must_use]
    pub fn nodes(&self) -> &[ScopeNode] {
        &self.nodes
    }

    #[must_use]
    pub fn root_id(&self) -> ScopeId {
        0
    }

    /// Walks outward from `scope_id` looking for a variable named `name`.
    #[must_use]
    pub fn find_variable(&self, scope_id: ScopeId, name: &str) -> Option<(&Variable, ScopeId)> {
        let mut current = Some(scope_id);
        while let Some(id) = current {
            let node = &self.nodes[id];
            if let Some(var) = node.variable(name) {
                return Some((var, id));
            }
            current = node.parent;
        }
        None
    }

    /// Closes any scopes still open at end of file, so every scope has an
    /// `end_line` even for malformed/truncated input.
    pub fn finish(&mut self, last_line: usize) {
        while self.stack.len() > 1 {
            self.pop_scope(last_line);
        }
    }

    fn push_scope(&mut self, kind: ScopeKind, name: String, start_line: usize) -> ScopeId {
        let parent = self.current_scope_id();
        if self.stack.len() >= self.options.max_depth {
            tracing::warn!(max_depth = self.options.max_depth, line = start_line, "scope nesting exceeds max_depth; attributing to enclosing scope");
            self.suppressed_depth += 1;
            return parent;
        }

        let id = self.nodes.len();
        self.nodes.push(ScopeNode {
            id,
            kind,
            name,
            start_line,
            end_line: None,
            parent: Some(parent),
            children: Vec::new(),
            variables: Vec::new(),
            return_type: None,
        });
        self.nodes[parent].children.push(id);
        self.stack.push(id);
        id
    }

    fn pop_scope(&mut self, end_line: usize) {
        if self.suppressed_depth > 0 {
            self.suppressed_depth -= 1;
            return;
        }
        if self.stack.len() <= 1 {
            return;
        }
        let id = self.stack.pop().expect("checked non-empty above");
        self.nodes[id].end_line = Some(end_line);
    }

    fn declare_variable(&mut self, var: Variable) {
        let id = self.current_scope_id();
        self.nodes[id].variables.push(var);
    }

    /// Processes one 1-indexed source line, advancing the scope tree and
    /// variable tables (spec.md §4.3 "Per-line processing", steps 1-7).
    pub fn process_line(&mut self, line_no: usize, raw_line: &str, context: &ContextMap, registry: &PatternRegistry) {
        let masked = patterns::mask_non_code(raw_line, line_no, context);
        let trimmed = masked.trim();

        if let Some(mut pending) = self.pending_signature.take() {
            pending.buffer.push(' ');
            pending.buffer.push_str(trimmed);
            if trimmed.ends_with('{') {
                self.open_function_scope(pending);
            } else {
                self.pending_signature = Some(pending);
            }
            return;
        }

        if trimmed.is_empty() {
            return;
        }

        // Step 2, compound: `} else if (...) {` / `} else {` / `} catch ... {`
        // close the prior branch scope before opening the next one.
        if patterns::closer().is_match(trimmed) {
            self.pop_scope(line_no);

            if else_if_opener().is_match(trimmed) {
                self.push_scope(ScopeKind::If, String::new(), line_no);
                return;
            }
            if patterns::else_opener().is_match(trimmed) {
                self.push_scope(ScopeKind::Else, String::new(), line_no);
                return;
            }
            if patterns::catch_opener().is_match(trimmed) {
                self.push_scope(ScopeKind::Catch, String::new(), line_no);
                return;
            }
            return;
        }

        // Step 1 & 7: function/test declarations.
        if let Some(caps) = patterns::function_opener().captures(trimmed) {
            let name = caps[1].to_string();
            let pending = PendingSignature { name, buffer: trimmed.to_string(), start_line: line_no };
            if trimmed.ends_with('{') {
                self.open_function_scope(pending);
            } else {
                self.pending_signature = Some(pending);
            }
            return;
        }
        if let Some(caps) = patterns::test_opener().captures(trimmed) {
            let name = caps.get(1).map_or_else(String::new, |m| m.as_str().to_string());
            self.push_scope(ScopeKind::TestFunction, name, line_no);
            return;
        }

        // Step 1: remaining scope openers.
        if patterns::if_opener().is_match(trimmed) {
            self.push_scope(ScopeKind::If, String::new(), line_no);
            return;
        }
        if patterns::while_opener().is_match(trimmed) || patterns::inline_opener().is_match(trimmed) {
            let kind = if trimmed.trim_start().starts_with("inline") { ScopeKind::Inline } else { ScopeKind::WhileLoop };
            self.push_scope(kind, String::new(), line_no);
            return;
        }
        if patterns::for_opener().is_match(trimmed) {
            self.push_scope(ScopeKind::ForLoop, String::new(), line_no);
            return;
        }
        if patterns::switch_opener().is_match(trimmed) {
            self.push_scope(ScopeKind::Switch, String::new(), line_no);
            return;
        }
        if patterns::comptime_opener().is_match(trimmed) {
            self.push_scope(ScopeKind::Comptime, String::new(), line_no);
            return;
        }
        if patterns::catch_opener().is_match(trimmed) {
            self.push_scope(ScopeKind::Catch, String::new(), line_no);
            return;
        }
        if patterns::errdefer_block_opener().is_match(trimmed) {
            self.push_scope(ScopeKind::ErrorBlock, String::new(), line_no);
            return;
        }
        if patterns::struct_init_opener().is_match(trimmed) {
            self.push_scope(ScopeKind::StructInit, String::new(), line_no);
            return;
        }
        if trimmed.ends_with('{') {
            self.push_scope(ScopeKind::Block, String::new(), line_no);
            return;
        }

        // Steps 3-6: ordinary statements.
        self.recognize_allocation(line_no, trimmed, registry);
        self.recognize_arena_struct(line_no, trimmed, registry);
        self.recognize_arena_alias(line_no, trimmed);
        if self.options.track_defer {
            self.recognize_defer(line_no, trimmed, registry);
        }
        self.recognize_ownership(line_no, trimmed);
    }

    fn open_function_scope(&mut self, pending: PendingSignature) {
        let kind = ScopeKind::Function;
        let id = self.push_scope(kind, pending.name, pending.start_line);

        let Some((params_text, return_type)) = split_signature(&pending.buffer) else {
            return;
        };
        self.nodes[id].return_type = Some(return_type);

        for param in split_top_level_commas(&params_text) {
            let param = param.trim().trim_start_matches("comptime ").trim();
            if param.is_empty() {
                continue;
            }
            let Some((name, ty)) = param.split_once(':') else { continue };
            let name = name.trim();
            let ty = ty.trim();
            if ty.contains("Allocator") {
                let mut var = Variable::new(name, pending.start_line);
                var.allocator_source = Some(PARAMETER_ALLOCATOR.to_string());
                var.allocator_identity = Some(name.to_string());
                self.nodes[id].variables.push(var);
            }
        }
    }

    fn recognize_allocation(&mut self, line_no: usize, line: &str, registry: &PatternRegistry) {
        let Some(caps) = patterns::allocation_decl().captures(line) else { return };
        let var_name = caps[1].to_string();
        let allocator_ident = caps[2].to_string();

        let mut var = Variable::new(var_name, line_no);
        var.is_allocation_site = true;
        if self.options.track_arena {
            if let Some((source, id)) = self.find_variable(self.current_scope_id(), &allocator_ident) {
                if source.is_arena_source {
                    var.is_arena_allocated = true;
                    var.allocator_source = source.allocator_source.clone();
                    var.allocator_identity = source.allocator_identity.clone();
                    let _ = id;
                    self.declare_variable(var);
                    return;
                }
            }
        }
        if let Some((source, _id)) = self.find_variable(self.current_scope_id(), &allocator_ident) {
            var.allocator_source = source.allocator_source.clone();
            var.allocator_identity = source.allocator_identity.clone();
            var.is_arena_allocated = source.is_arena_allocated;
        } else {
            var.allocator_source = registry.resolve_allocator(&allocator_ident).map(str::to_string);
            // Unclassified allocators keep the raw identifier as their identity so the
            // Memory Analyzer can still name them in diagnostics.
            var.allocator_identity = Some(var.allocator_source.clone().unwrap_or(allocator_ident));
        }
        self.declare_variable(var);
    }

    fn recognize_arena_struct(&mut self, line_no: usize, line: &str, registry: &PatternRegistry) {
        if !self.options.track_arena {
            return;
        }
        let Some(caps) = patterns::arena_struct_decl().captures(line) else { return };
        let var_name = caps[1].to_string();
        let mut var = Variable::new(var_name, line_no);
        var.allocator_source = registry.resolve_allocator(&caps[2]).map(str::to_string);
        var.allocator_identity = var.allocator_source.clone();
        var.is_arena_source = true;
        var.is_arena_struct = true;
        self.declare_variable(var);
    }

    fn recognize_arena_alias(&mut self, line_no: usize, line: &str) {
        if !self.options.track_arena {
            return;
        }
        let Some(caps) = patterns::arena_alias_decl().captures(line) else { return };
        let alias_name = caps[1].to_string();
        let arena_name = caps[2].to_string();

        let Some((arena_var, _)) = self.find_variable(self.current_scope_id(), &arena_name) else { return };
        if !arena_var.is_arena_source {
            return;
        }
        let mut var = Variable::new(alias_name, line_no);
        var.allocator_source = arena_var.allocator_source.clone();
        var.allocator_identity = arena_var.allocator_identity.clone();
        var.is_arena_allocated = true;
        var.is_arena_source = true;
        self.declare_variable(var);
    }

    fn recognize_defer(&mut self, line_no: usize, line: &str, registry: &PatternRegistry) {
        let Some(caps) = patterns::defer_stmt().captures(line) else { return };
        let keyword = caps[1].to_string();
        let expr = caps[2].to_string();
        let column = line.find(keyword.as_str()).map_or(1, |i| i + 1);

        let free_caps = patterns::free_call().captures(&expr);
        let target_name = free_caps
            .as_ref()
            .map(|c| c[3].to_string())
            .or_else(|| patterns::deinit_call().captures(&expr).map(|c| c[1].to_string()));

        let Some(target_name) = target_name else { return };
        let scope_id = self.current_scope_id();
        let mut owner = Some(scope_id);
        while let Some(id) = owner {
            if let Some(var) = self.nodes[id].variable_mut(&target_name) {
                if keyword == "defer" {
                    var.has_defer_cleanup = true;
                } else {
                    var.has_errdefer_cleanup = true;
                }
                break;
            }
            owner = self.nodes[id].parent;
        }

        if self.innermost_loop_ancestor(scope_id) {
            self.defer_in_loop_sites.push(LoopDeferSite { line: line_no, column, variable: target_name.clone() });
        }

        if let Some(free_caps) = free_caps {
            let free_ident = &free_caps[1];
            let free_allocator = self.find_variable(scope_id, free_ident).and_then(|(v, _)| v.allocator_identity.clone())
                .or_else(|| registry.resolve_allocator(free_ident).map(str::to_string));
            let original_allocator = self.find_variable(scope_id, &target_name).and_then(|(v, _)| v.allocator_identity.clone());
            if let (Some(free_allocator), Some(original_allocator)) = (free_allocator, original_allocator) {
                if free_allocator != original_allocator {
                    self.allocator_mismatch_sites.push(MismatchSite {
                        line: line_no,
                        column,
                        variable: target_name,
                        free_allocator,
                        original_allocator,
                    });
                }
            }
        }
    }

    /// `true` if `scope_id`, or any ancestor up to (and including) the
    /// nearest enclosing function boundary, is a loop scope.
    #[must_use]
    pub fn innermost_loop_ancestor(&self, scope_id: ScopeId) -> bool {
        let mut current = Some(scope_id);
        while let Some(id) = current {
            let node = &self.nodes[id];
            if node.kind.is_loop() {
                return true;
            }
            if node.kind.is_function() {
                return false;
            }
            current = node.parent;
        }
        false
    }

    fn recognize_ownership(&mut self, _line_no: usize, line: &str) {
        let mut names = Vec::new();
        if let Some(caps) = patterns::return_ident().captures(line) {
            names.push(caps[1].to_string());
        }
        if line.trim_start().starts_with("return") {
            for caps in patterns::return_struct_field().captures_iter(line) {
                names.push(caps[1].to_string());
            }
        }

        for name in names {
            let scope_id = self.current_scope_id();
            let mut owner = Some(scope_id);
            while let Some(id) = owner {
                if let Some(var) = self.nodes[id].variable_mut(&name) {
                    var.ownership_transferred = true;
                    break;
                }
                owner = self.nodes[id].parent;
            }
        }
    }
}

use std::sync::OnceLock;

use regex::Regex;

fn else_if_opener() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"^\s*\}\s*else\s+if\s*\(.*\)\s*\{").expect("static pattern is valid regex"))
}

/// Splits `buffer` (everything from `fn NAME` through the trailing `{`) into
/// the parameter-list text and the return-type text, using parenthesis depth
/// to find the end of the parameter list.
fn split_signature(buffer: &str) -> Option<(String, String)> {
    let open = buffer.find('(')?;
    let bytes = buffer.as_bytes();
    let mut depth = 0i32;
    let mut close = None;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close?;
    let params = buffer[open + 1..close].to_string();
    let after_close = &buffer[close + 1..];
    let brace = after_close.rfind('{')?;
    let return_type = after_close[..brace].trim().to_string();
    Some((params, return_type))
}

/// Splits `text` on commas that are not nested inside `()`/`[]`/`{}`.
fn split_top_level_commas(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(text[start..i].to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].to_string());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use zignostic_context::ContextMap;
    use zignostic_pattern::PatternConfig;

    fn run(source: &str) -> ScopeTracker {
        let context = ContextMap::build(source);
        let registry = PatternRegistry::build(&PatternConfig::enabled());
        let mut tracker = ScopeTracker::new(ScopeTrackerOptions::default());
        for (i, line) in source.lines().enumerate() {
            tracker.process_line(i + 1, line, &context, &registry);
        }
        tracker.finish(source.lines().count());
        tracker
    }

    #[test]
    fn function_scope_tracks_parameter_allocator() {
        let tracker = run(indoc! {"
            fn f(a: Allocator) void {
                const b = try a.alloc(u8, 16);
            }
        "});
        let func = tracker.nodes().iter().find(|n| n.kind == ScopeKind::Function).unwrap();
        assert_eq!(func.name, "f");
        assert!(func.variable("a").unwrap().allocator_source.as_deref() == Some(PARAMETER_ALLOCATOR));
        let b = func.variable("b").unwrap();
        assert_eq!(b.allocator_source.as_deref(), Some(PARAMETER_ALLOCATOR));
        assert!(!b.has_defer_cleanup);
    }

    #[test]
    fn defer_free_marks_cleanup() {
        let tracker = run(indoc! {"
            fn f(a: Allocator) void {
                const b = try a.alloc(u8, 16);
                defer a.free(b);
            }
        "});
        let func = tracker.nodes().iter().find(|n| n.kind == ScopeKind::Function).unwrap();
        assert!(func.variable("b").unwrap().has_defer_cleanup);
    }

    #[test]
    fn errdefer_does_not_set_has_defer_cleanup() {
        let tracker = run(indoc! {"
            fn f(a: Allocator) void {
                const b = try a.alloc(u8, 16);
                errdefer a.free(b);
            }
        "});
        let func = tracker.nodes().iter().find(|n| n.kind == ScopeKind::Function).unwrap();
        let b = func.variable("b").unwrap();
        assert!(!b.has_defer_cleanup);
        assert!(b.has_errdefer_cleanup);
    }

    #[test]
    fn return_marks_ownership_transferred() {
        let tracker = run(indoc! {"
            fn create(a: Allocator) ![]u8 {
                const b = try a.alloc(u8, 16);
                return b;
            }
        "});
        let func = tracker.nodes().iter().find(|n| n.kind == ScopeKind::Function).unwrap();
        assert!(func.variable("b").unwrap().ownership_transferred);
        assert_eq!(func.return_type.as_deref(), Some("![]u8"));
    }

    #[test]
    fn arena_allocator_alias_propagates() {
        let tracker = run(indoc! {"
            fn f(a: Allocator) void {
                var arena = ArenaAllocator.init(a);
                defer arena.deinit();
                const alloc2 = arena.allocator();
                const b = try alloc2.alloc(u8, 16);
            }
        "});
        let func = tracker.nodes().iter().find(|n| n.kind == ScopeKind::Function).unwrap();
        assert!(func.variable("arena").unwrap().has_defer_cleanup);
        assert!(func.variable("b").unwrap().is_arena_allocated);
    }

    #[test]
    fn nested_if_scope_is_child_of_function() {
        let tracker = run(indoc! {"
            fn f(a: Allocator) void {
                if (true) {
                    const b = try a.alloc(u8, 1);
                }
            }
        "});
        let func_id = tracker.nodes().iter().find(|n| n.kind == ScopeKind::Function).unwrap().id;
        let if_scope = tracker.nodes().iter().find(|n| n.kind == ScopeKind::If).unwrap();
        assert_eq!(if_scope.parent, Some(func_id));
        assert!(if_scope.variable("b").is_some());
    }

    #[test]
    fn while_loop_is_detected_as_loop_ancestor() {
        let tracker = run(indoc! {"
            fn f(a: Allocator) void {
                while (true) {
                    defer a.free(x);
                }
            }
        "});
        let while_scope = tracker.nodes().iter().find(|n| n.kind == ScopeKind::WhileLoop).unwrap();
        assert!(tracker.innermost_loop_ancestor(while_scope.id));
    }

    #[test]
    fn reset_produces_fresh_tracker() {
        let mut tracker = run("fn f() void {\n}\n");
        assert!(tracker.nodes().len() > 1);
        tracker.reset();
        assert_eq!(tracker.nodes().len(), 1);
        assert_eq!(tracker.current_scope_id(), tracker.root_id());
    }

    #[test]
    fn max_depth_guard_attributes_excess_nesting_to_parent() {
        let options = ScopeTrackerOptions { max_depth: 2, ..ScopeTrackerOptions::default() };
        let context = ContextMap::build("");
        let registry = PatternRegistry::build(&PatternConfig::enabled());
        let mut tracker = ScopeTracker::new(options);
        let source = indoc! {"
            fn f() void {
                if (true) {
                    if (true) {
                    }
                }
            }
        "};
        for (i, line) in source.lines().enumerate() {
            tracker.process_line(i + 1, line, &context, &registry);
        }
        tracker.finish(source.lines().count());
        // Root (depth 0) + `fn` (depth 1) hits max_depth; the nested `if`s
        // never become real scope nodes.
        assert!(tracker.nodes().iter().all(|n| n.kind != ScopeKind::If));
    }
}
