//! Scope and variable records.

/// The thirteen scope kinds spec.md §1/§4.3 recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Function,
    TestFunction,
    If,
    Else,
    WhileLoop,
    ForLoop,
    Switch,
    Comptime,
    Inline,
    StructInit,
    Catch,
    ErrorBlock,
    /// A bare `{ ... }` at statement position, or the implicit file-level
    /// root scope every file opens with.
    Block,
}

impl ScopeKind {
    #[must_use]
    pub const fn is_loop(self) -> bool {
        matches!(self, Self::WhileLoop | Self::ForLoop)
    }

    #[must_use]
    pub const fn is_function(self) -> bool {
        matches!(self, Self::Function | Self::TestFunction)
    }
}

/// A unique identifier for a [`ScopeNode`] within one [`crate::ScopeTracker`].
pub type ScopeId = usize;

/// A variable declared within exactly one scope.
///
/// `allocator_identity`, `has_errdefer_cleanup`, `is_arena_source`,
/// `is_arena_struct`, and `is_allocation_site` are bookkeeping beyond
/// spec.md §3's public Variable Record: `allocator_identity` gives
/// allocator-mismatch detection something finer-grained to compare than the
/// shared `parameter_allocator` classification; `has_errdefer_cleanup`
/// distinguishes `errdefer` cleanup (which never satisfies `missing_defer`,
/// only the `missing_errdefer` error-path obligation, per spec.md §9's Open
/// Question resolution) from `has_defer_cleanup`; `is_arena_source` lets
/// `arena.allocator()` aliasing chain through more than one hop while
/// `is_arena_struct` keeps the arena instance itself distinguishable from
/// its aliases; `is_allocation_site` marks a variable as an allocation
/// result (as opposed to a function parameter allocator handle, an arena
/// itself, or an arena alias) so the Memory Analyzer's allocation-discipline
/// rules only ever fire on the allocation, never on the allocator handle it
/// went through. None of these cross into the returned `Diagnostic`.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub declaration_line: usize,
    pub allocator_source: Option<String>,
    /// The concrete identity used to detect allocator mismatches (spec.md
    /// §4.4 rule 7): a parameter allocator's own name (so two distinct
    /// `Allocator`-typed parameters never compare equal), the same value as
    /// `allocator_source` for a registry-classified concrete allocator, or
    /// the raw identifier text when `allocator_source` failed to classify
    /// (so the Memory Analyzer can still name the allocator it found).
    pub allocator_identity: Option<String>,
    pub is_arena_allocated: bool,
    pub has_defer_cleanup: bool,
    pub ownership_transferred: bool,
    pub has_errdefer_cleanup: bool,
    /// `true` for any variable sourced from an arena, directly or through an
    /// alias chain (propagates through `arena.allocator()`). Used only to
    /// carry arena-ness forward; see `is_arena_struct` for the arena
    /// instance itself.
    pub is_arena_source: bool,
    /// `true` only for the `ArenaAllocator.init(...)` instance itself, never
    /// for an alias obtained via `.allocator()`. The arena-in-library check
    /// needs this distinction: an alias has nothing of its own to `deinit`.
    pub is_arena_struct: bool,
    pub is_allocation_site: bool,
}

impl Variable {
    #[must_use]
    pub fn new(name: impl Into<String>, declaration_line: usize) -> Self {
        Self {
            name: name.into(),
            declaration_line,
            allocator_source: None,
            allocator_identity: None,
            is_arena_allocated: false,
            has_defer_cleanup: false,
            ownership_transferred: false,
            has_errdefer_cleanup: false,
            is_arena_source: false,
            is_arena_struct: false,
            is_allocation_site: false,
        }
    }
}

/// A node in the scope forest. Children are referenced by id; the scope owns
/// its variables directly, so there is no need for variables to point back
/// to their scope.
#[derive(Debug, Clone)]
pub struct ScopeNode {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub name: String,
    pub start_line: usize,
    pub end_line: Option<usize>,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub variables: Vec<Variable>,
    /// The return-type text between the parameter list's closing `)` and
    /// the body's opening `{`, for `Function`/`TestFunction` scopes. Parsed
    /// once here so the Memory Analyzer's ownership-transfer exemption
    /// (spec.md §4.4 rule 2) doesn't re-parse the signature itself.
    pub return_type: Option<String>,
}

impl ScopeNode {
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    #[must_use]
    pub fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.variables.iter_mut().find(|v| v.name == name)
    }
}
