//! Line-level regex patterns the Scope Tracker matches against code-masked
//! source lines. Every regex is compiled once and cached for the life of the
//! process, matching the "build once" spirit of spec.md §4.1's classifier
//! caching guidance.

use std::sync::OnceLock;

use regex::Regex;
use zignostic_context::ContextMap;

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern is valid regex"))
}

/// Replaces every non-code byte on `line` (as classified by `context` at
/// `line_no`) with a space, preserving byte length and column alignment so
/// pattern matches never fire on commented-out or quoted text.
#[must_use]
pub fn mask_non_code(line: &str, line_no: usize, context: &ContextMap) -> String {
    line.bytes()
        .enumerate()
        .map(|(i, b)| if context.kind_at(line_no, i + 1).is_code() { b } else { b' ' })
        .map(|b| b as char)
        .collect()
}

pub fn function_opener() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*(?:pub\s+)?(?:export\s+)?(?:inline\s+)?fn\s+([A-Za-z_]\w*)\s*\(")
}

pub fn test_opener() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r#"^\s*test\s*(?:"([^"]*)")?\s*\{"#)
}

pub fn if_opener() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*\}?\s*if\s*\(.*\)\s*\{")
}

pub fn else_opener() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*\}\s*else\b.*\{")
}

pub fn while_opener() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*(?:\w+:\s*)?while\s*\(.*\)\s*\{")
}

pub fn for_opener() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*(?:\w+:\s*)?for\s*\(.*\)\s*\{")
}

pub fn switch_opener() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*switch\s*\(.*\)\s*\{")
}

pub fn comptime_opener() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*comptime\s*\{")
}

pub fn inline_opener() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*inline\s+(?:while|for)\s*\(.*\)\s*\{")
}

pub fn catch_opener() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*\}?\s*catch\s*(?:\|[^|]*\|)?\s*\{")
}

pub fn errdefer_block_opener() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*errdefer\s*\{")
}

pub fn struct_init_opener() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*(?:return\s+|=\s*)?(?:\.|[A-Za-z_][\w.]*)\{$")
}

pub fn closer() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*\}")
}

pub fn allocation_decl() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(
        &CELL,
        r"^\s*(?:const|var)\s+([A-Za-z_]\w*)\s*=\s*(?:try\s+)?([A-Za-z_][\w.]*)\.(alloc\w*|create|dupe)\s*\(",
    )
}

pub fn arena_struct_decl() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*(?:const|var)\s+([A-Za-z_]\w*)\s*=\s*(?:[\w.]*\.)?(ArenaAllocator)\.init\s*\(")
}

pub fn arena_alias_decl() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*(?:const|var)\s+([A-Za-z_]\w*)\s*=\s*([A-Za-z_]\w*)\.allocator\s*\(\s*\)")
}

pub fn defer_stmt() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*(defer|errdefer)\s+(.+?);?\s*$")
}

pub fn free_call() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"([A-Za-z_][\w.]*)\.(free|destroy)\s*\(\s*([A-Za-z_]\w*)")
}

pub fn deinit_call() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^([A-Za-z_]\w*)\.deinit\s*\(\s*\)")
}

pub fn return_ident() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"^\s*return\s+(?:try\s+)?([A-Za-z_]\w*)\s*;?\s*$")
}

pub fn return_struct_field() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"\.\w+\s*=\s*([A-Za-z_]\w*)\s*[,}]")
}

pub fn try_expr() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    cached(&CELL, r"\btry\b")
}
