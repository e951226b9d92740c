//! Shared printer context, one instance per type, re-initialized per method.
//!
//! The statement printer's pre-pass registers multi-statement closures here;
//! the expression printer later resolves them by encounter order. Both
//! printers walk sub-expressions in AST field order, which is what keeps the
//! registration cursor and the emission cursor aligned.

use fnv::FnvHashMap;

use fanpy_ast::{ClosureExpr, Symbol};

/// Whether the printer is currently inside a closure body, and of which form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureKind {
    /// Single-expression closure emitted as an inline lambda; `this` becomes
    /// the lambda's `_outer` default argument.
    Inline,
    /// Multi-statement closure extracted to a `def`; `this` becomes `_self`.
    Extracted,
}

/// A multi-statement closure found by the pre-pass scan.
#[derive(Debug, Clone)]
pub struct RegisteredClosure {
    pub id: usize,
    /// Index of the scope-level statement that first mentions the closure;
    /// its `def` is emitted immediately before that statement.
    pub first_use: usize,
    pub node: ClosureExpr,
}

/// Registration table for one closure nesting level.
#[derive(Debug, Default)]
pub struct ClosureScope {
    pub registered: Vec<RegisteredClosure>,
    /// Encounter-order cursor consumed by the expression printer.
    pub cursor: usize,
    /// Next registration whose `def` is still pending emission.
    pub next_def: usize,
}

impl ClosureScope {
    pub fn new(registered: Vec<RegisteredClosure>) -> Self {
        Self {
            registered,
            cursor: 0,
            next_def: 0,
        }
    }
}

#[derive(Debug)]
pub struct PrinterState {
    pub current_pod: Symbol,
    pub current_type: Symbol,
    pub current_method: Symbol,
    pub in_static: bool,
    /// Unique-id generators; unique within one type.
    pub closure_count: usize,
    pub switch_count: usize,
    /// For-loop update statements, pre-rendered; `None` entries are plain
    /// `while` loops. `continue` consults the top entry.
    pub loop_updates: Vec<Option<String>>,
    /// Original local name -> its captured-variable wrapper name.
    pub param_wrappers: FnvHashMap<Symbol, Symbol>,
    /// One scope per closure nesting level; index 0 is the method body.
    pub closure_scopes: Vec<ClosureScope>,
    pub closure_ctx: Vec<ClosureKind>,
    /// Catch variables bound by `except ... as`; their localDefs are dropped.
    pub suppressed_catch_vars: Vec<Symbol>,
}

impl PrinterState {
    pub fn new(pod: impl Into<Symbol>, type_name: impl Into<Symbol>) -> Self {
        Self {
            current_pod: pod.into(),
            current_type: type_name.into(),
            current_method: Symbol::new(),
            in_static: false,
            closure_count: 0,
            switch_count: 0,
            loop_updates: Vec::new(),
            param_wrappers: FnvHashMap::default(),
            closure_scopes: Vec::new(),
            closure_ctx: Vec::new(),
            suppressed_catch_vars: Vec::new(),
        }
    }

    /// Reset the per-method context; id generators run on across methods so
    /// helper names stay unique within the type.
    pub fn enter_method(&mut self, name: impl Into<Symbol>, is_static: bool) {
        self.current_method = name.into();
        self.in_static = is_static;
        self.loop_updates.clear();
        self.param_wrappers.clear();
        self.closure_scopes.clear();
        self.closure_ctx.clear();
        self.suppressed_catch_vars.clear();
    }

    /// The expression `this` lowers to in the current context.
    pub fn this_ref(&self) -> &'static str {
        match self.closure_ctx.last() {
            None => "self",
            Some(ClosureKind::Inline) => "_outer",
            Some(ClosureKind::Extracted) => "_self",
        }
    }

    pub fn next_closure_id(&mut self) -> usize {
        let id = self.closure_count;
        self.closure_count += 1;
        id
    }

    pub fn next_switch_var(&mut self) -> String {
        let id = self.switch_count;
        self.switch_count += 1;
        format!("_switch_{}", id)
    }

    /// Innermost closure registration scope.
    pub fn scope_mut(&mut self) -> Option<&mut ClosureScope> {
        self.closure_scopes.last_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn this_ref_tracks_closure_context() {
        let mut state = PrinterState::new("acme", "Widget");
        assert_eq!(state.this_ref(), "self");
        state.closure_ctx.push(ClosureKind::Inline);
        assert_eq!(state.this_ref(), "_outer");
        state.closure_ctx.push(ClosureKind::Extracted);
        assert_eq!(state.this_ref(), "_self");
        state.closure_ctx.pop();
        assert_eq!(state.this_ref(), "_outer");
    }

    #[test]
    fn id_generators_run_across_methods() {
        let mut state = PrinterState::new("acme", "Widget");
        state.enter_method("a", false);
        assert_eq!(state.next_closure_id(), 0);
        assert_eq!(state.next_switch_var(), "_switch_0");
        state.enter_method("b", true);
        assert_eq!(state.next_closure_id(), 1);
        assert_eq!(state.next_switch_var(), "_switch_1");
        assert!(state.in_static);
    }

    #[test]
    fn enter_method_clears_per_method_tables() {
        let mut state = PrinterState::new("acme", "Widget");
        state.param_wrappers.insert("x".into(), "x_wrap".into());
        state.loop_updates.push(None);
        state.enter_method("next", false);
        assert!(state.param_wrappers.is_empty());
        assert!(state.loop_updates.is_empty());
    }
}
