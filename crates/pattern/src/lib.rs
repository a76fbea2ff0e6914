//! Resolves identifier and return-type text to a canonical allocator or
//! ownership-transfer category, honoring user overrides over a fixed set of
//! shipped defaults.
//!
//! A [`PatternRegistry`] is built fresh from a [`PatternConfig`] at the start
//! of every analysis call (see spec.md §9, "Global state") — it is never a
//! process-wide singleton, so two calls with different configuration never
//! interfere with each other.

use serde::Deserialize;
use serde::Serialize;

/// A user- or library-defined rule mapping identifier text containing
/// `pattern` to the canonical allocator `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorPatternRule {
    pub name: String,
    pub pattern: String,
}

impl AllocatorPatternRule {
    #[must_use]
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self { name: name.into(), pattern: pattern.into() }
    }
}

/// A user- or library-defined rule identifying ownership-transferring
/// functions by name and/or return-type text. A field left `None` is not
/// checked; a rule with both fields set requires both to match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipPatternRule {
    pub function_pattern: Option<String>,
    pub return_type_pattern: Option<String>,
}

impl OwnershipPatternRule {
    #[must_use]
    pub fn by_function_name(pattern: impl Into<String>) -> Self {
        Self { function_pattern: Some(pattern.into()), return_type_pattern: None }
    }

    #[must_use]
    pub fn by_return_type(pattern: impl Into<String>) -> Self {
        Self { function_pattern: None, return_type_pattern: Some(pattern.into()) }
    }

    fn matches(&self, function_name: &str, return_type: &str) -> bool {
        let name_ok = self.function_pattern.as_deref().is_none_or(|p| function_name.contains(p));
        let return_ok = self.return_type_pattern.as_deref().is_none_or(|p| return_type.contains(p));
        name_ok && return_ok
    }
}

/// User-facing configuration for the Pattern Registry (the `memory` fields
/// of spec.md §6 that concern allocator/ownership classification).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub use_default_allocator_patterns: bool,
    pub disabled_default_allocator_patterns: Vec<String>,
    pub allocator_patterns: Vec<AllocatorPatternRule>,
    pub use_default_ownership_patterns: bool,
    pub ownership_patterns: Vec<OwnershipPatternRule>,
    pub allowed_allocators: Vec<String>,
}

impl PatternConfig {
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            use_default_allocator_patterns: true,
            disabled_default_allocator_patterns: Vec::new(),
            allocator_patterns: Vec::new(),
            use_default_ownership_patterns: true,
            ownership_patterns: Vec::new(),
            allowed_allocators: Vec::new(),
        }
    }
}

/// The canonical allocator identity for the synthetic parameter-allocator
/// tag (spec.md §3, §4.4 "Parameter-allocator policy").
pub const PARAMETER_ALLOCATOR: &str = "parameter_allocator";

/// The canonical name the library assigns to the conventional test
/// allocator, regardless of which of its two spellings was used.
pub const TEST_ALLOCATOR: &str = "std.testing.allocator";

/// Shipped default allocator rules, in the library's documented, stable
/// iteration order. Multiple rules may map to the same canonical name.
const DEFAULT_ALLOCATOR_RULES: &[(&str, &str)] = &[
    ("std.heap.GeneralPurposeAllocator", "GeneralPurposeAllocator"),
    ("std.heap.ArenaAllocator", "ArenaAllocator"),
    ("std.heap.FixedBufferAllocator", "FixedBufferAllocator"),
    ("std.heap.page_allocator", "page_allocator"),
    ("std.heap.c_allocator", "c_allocator"),
    ("std.heap.raw_c_allocator", "raw_c_allocator"),
    (TEST_ALLOCATOR, "std.testing.allocator"),
    (TEST_ALLOCATOR, "testing.allocator"),
    ("std.heap.LoggingAllocator", "LoggingAllocator"),
];

/// Shipped default ownership-transfer rules, in documented, stable order.
/// Constructor-like names first, then allocation-like return-type shapes.
fn default_ownership_rules() -> Vec<OwnershipPatternRule> {
    const FUNCTION_NAMES: &[&str] =
        &["create", "init", "make", "new", "clone", "duplicate", "dupe", "copy", "toString", "toSlice", "format", "alloc"];
    const RETURN_TYPES: &[&str] = &["[]u8", "[]const u8"];

    let mut rules: Vec<OwnershipPatternRule> =
        FUNCTION_NAMES.iter().map(|n| OwnershipPatternRule::by_function_name(*n)).collect();
    rules.extend(RETURN_TYPES.iter().map(|t| OwnershipPatternRule::by_return_type(*t)));
    rules
}

/// `true` if `return_type` denotes an owned raw-pointer return (`*T`,
/// `!*T`, `?*T`), per spec.md's Open Question resolution: a return type
/// containing `fn(` is a function pointer, never an owned-pointer return.
#[must_use]
pub fn is_owned_pointer_return(return_type: &str) -> bool {
    return_type.contains('*') && !return_type.contains("fn(")
}

/// A registry built from configuration, resolving identifier and
/// return-type text to canonical categories for the duration of one
/// analysis call.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    allocator_rules: Vec<AllocatorPatternRule>,
    ownership_rules: Vec<OwnershipPatternRule>,
    allowed_allocators: Vec<String>,
}

impl PatternRegistry {
    /// Builds a registry from `config`: user rules first, then enabled,
    /// non-disabled defaults, in the order spec.md §4.2/§9 documents.
    #[must_use]
    pub fn build(config: &PatternConfig) -> Self {
        let mut allocator_rules = config.allocator_patterns.clone();
        if config.use_default_allocator_patterns {
            for (name, pattern) in DEFAULT_ALLOCATOR_RULES {
                if config.disabled_default_allocator_patterns.iter().any(|d| d == name) {
                    continue;
                }
                allocator_rules.push(AllocatorPatternRule::new(*name, *pattern));
            }
        }

        let mut ownership_rules = config.ownership_patterns.clone();
        if config.use_default_ownership_patterns {
            ownership_rules.extend(default_ownership_rules());
        }

        Self { allocator_rules, ownership_rules, allowed_allocators: config.allowed_allocators.clone() }
    }

    /// Resolves `identifier` (the allocator handle's name) to a canonical
    /// allocator name, or `None` if unclassified. User rules (the prefix of
    /// `allocator_rules` inserted ahead of any enabled defaults) always win.
    #[must_use]
    pub fn resolve_allocator(&self, identifier: &str) -> Option<&str> {
        self.allocator_rules.iter().find(|rule| identifier.contains(rule.pattern.as_str())).map(|rule| rule.name.as_str())
    }

    /// `true` if any enabled ownership rule matches `function_name` and
    /// `return_type`, or if `return_type` is an owned-pointer return not
    /// excluded as a function pointer.
    #[must_use]
    pub fn resolve_ownership(&self, function_name: &str, return_type: &str) -> bool {
        self.ownership_rules.iter().any(|rule| rule.matches(function_name, return_type))
            || is_owned_pointer_return(return_type)
    }

    /// The allowed-allocator check of spec.md §4.2: when `allowed_allocators`
    /// is non-empty, only a classified allocator whose name is in the list
    /// passes. An empty list permits everything.
    #[must_use]
    pub fn is_allowed(&self, canonical_name: Option<&str>) -> bool {
        if self.allowed_allocators.is_empty() {
            return true;
        }
        canonical_name.is_some_and(|name| self.allowed_allocators.iter().any(|a| a == name))
    }

    #[must_use]
    pub fn allowed_allocators(&self) -> &[String] {
        &self.allowed_allocators
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_rule_takes_precedence_over_default() {
        let mut config = PatternConfig::enabled();
        config.allocator_patterns.push(AllocatorPatternRule::new("MyPoolAllocator", "GeneralPurposeAllocator"));
        let registry = PatternRegistry::build(&config);
        assert_eq!(registry.resolve_allocator("my_gpa = GeneralPurposeAllocator.init()"), Some("MyPoolAllocator"));
    }

    #[test]
    fn disabling_a_default_removes_it() {
        let mut config = PatternConfig::enabled();
        config.disabled_default_allocator_patterns.push("std.heap.page_allocator".to_string());
        let registry = PatternRegistry::build(&config);
        assert_eq!(registry.resolve_allocator("std.heap.page_allocator"), None);
    }

    #[test]
    fn both_test_allocator_spellings_resolve_to_same_canonical_name() {
        let registry = PatternRegistry::build(&PatternConfig::enabled());
        assert_eq!(registry.resolve_allocator("std.testing.allocator"), Some(TEST_ALLOCATOR));
        assert_eq!(registry.resolve_allocator("testing.allocator"), Some(TEST_ALLOCATOR));
    }

    #[test]
    fn disabling_defaults_then_reenabling_is_byte_for_byte_default_behavior() {
        let enabled = PatternRegistry::build(&PatternConfig::enabled());
        let mut toggled = PatternConfig::enabled();
        toggled.disabled_default_allocator_patterns.push("std.heap.page_allocator".to_string());
        let disabled = PatternRegistry::build(&toggled);
        assert_ne!(disabled.resolve_allocator("std.heap.page_allocator"), enabled.resolve_allocator("std.heap.page_allocator"));
        let restored = PatternRegistry::build(&PatternConfig::enabled());
        assert_eq!(restored.resolve_allocator("std.heap.page_allocator"), enabled.resolve_allocator("std.heap.page_allocator"));
    }

    #[test]
    fn ownership_by_constructor_name() {
        let registry = PatternRegistry::build(&PatternConfig::enabled());
        assert!(registry.resolve_ownership("create", "void"));
        assert!(!registry.resolve_ownership("doWork", "void"));
    }

    #[test]
    fn ownership_by_slice_return_type() {
        let registry = PatternRegistry::build(&PatternConfig::enabled());
        assert!(registry.resolve_ownership("f", "![]u8"));
        assert!(registry.resolve_ownership("f", "?[]const u8"));
    }

    #[test]
    fn ownership_pointer_return_excludes_function_pointers() {
        assert!(is_owned_pointer_return("*Node"));
        assert!(is_owned_pointer_return("!*Node"));
        assert!(!is_owned_pointer_return("fn(*Node) void"));
    }

    #[test]
    fn allowed_allocators_empty_permits_everything() {
        let registry = PatternRegistry::build(&PatternConfig::enabled());
        assert!(registry.is_allowed(None));
        assert!(registry.is_allowed(Some("anything")));
    }

    #[test]
    fn allowed_allocators_restricts_to_list() {
        let mut config = PatternConfig::enabled();
        config.allowed_allocators.push("std.heap.GeneralPurposeAllocator".to_string());
        let registry = PatternRegistry::build(&config);
        assert!(registry.is_allowed(Some("std.heap.GeneralPurposeAllocator")));
        assert!(!registry.is_allowed(Some("std.heap.page_allocator")));
        assert!(!registry.is_allowed(None));
    }
}
