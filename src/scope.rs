use std::collections::HashMap;

use crate::analysis::registry::TypeId;
use crate::intern::Symbol;
use crate::source::SourcePos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Var,
    Const,
    Function,
    Message,
    /// Function referenced as an RTOS task entry.
    TaskEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Global,
    Parameter,
    Local,
}

#[derive(Debug, Clone, Copy)]
pub struct SymbolEntry {
    pub name: Symbol,
    pub kind: SymbolKind,
    pub ty: TypeId,
    pub storage: Storage,
    /// Frame slot for params/locals, global index otherwise.
    pub slot: u32,
    pub declared_at: SourcePos,
}

/// Lexical scope stack: one frame per global/function/block extent. Lookup
/// climbs from the innermost frame outward.
#[derive(Default)]
pub struct ScopeStack {
    scopes: Vec<HashMap<Symbol, SymbolEntry>>,
}

pub enum DeclareOutcome {
    Ok,
    /// Same name already bound in the current scope.
    Duplicate(SymbolEntry),
    /// Legal, but hides a binding from an enclosing scope.
    Shadows(SymbolEntry),
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn declare(&mut self, entry: SymbolEntry) -> DeclareOutcome {
        if let Some(current) = self.scopes.last() {
            if let Some(&existing) = current.get(&entry.name) {
                return DeclareOutcome::Duplicate(existing);
            }
        }
        let shadowed = self
            .scopes
            .iter()
            .rev()
            .skip(1)
            .find_map(|scope| scope.get(&entry.name).copied());
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(entry.name, entry);
        }
        match shadowed {
            Some(outer) => DeclareOutcome::Shadows(outer),
            None => DeclareOutcome::Ok,
        }
    }

    pub fn lookup(&self, name: Symbol) -> Option<&SymbolEntry> {
        for scope in self.scopes.iter().rev() {
            if let Some(entry) = scope.get(&name) {
                return Some(entry);
            }
        }
        None
    }

    /// All visible names, innermost last. Feeds the "did you mean" search.
    pub fn visible_names(&self) -> Vec<Symbol> {
        let mut names = Vec::new();
        for scope in &self.scopes {
            names.extend(scope.keys().copied());
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    fn entry(name: Symbol) -> SymbolEntry {
        SymbolEntry {
            name,
            kind: SymbolKind::Var,
            ty: TypeId::default(),
            storage: Storage::Local,
            slot: 0,
            declared_at: SourcePos::default(),
        }
    }

    #[test]
    fn lookup_climbs_scopes() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let mut scopes = ScopeStack::new();
        assert!(matches!(scopes.declare(entry(x)), DeclareOutcome::Ok));
        scopes.push_scope();
        assert!(scopes.lookup(x).is_some());
        scopes.pop_scope();
        assert!(scopes.lookup(x).is_some());
    }

    #[test]
    fn same_scope_redeclaration_is_a_duplicate() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let mut scopes = ScopeStack::new();
        scopes.declare(entry(x));
        assert!(matches!(
            scopes.declare(entry(x)),
            DeclareOutcome::Duplicate(_)
        ));
    }

    #[test]
    fn inner_scope_shadowing_is_reported_but_wins() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let mut scopes = ScopeStack::new();
        let mut outer = entry(x);
        outer.slot = 1;
        scopes.declare(outer);
        scopes.push_scope();
        let mut inner = entry(x);
        inner.slot = 2;
        assert!(matches!(
            scopes.declare(inner),
            DeclareOutcome::Shadows(_)
        ));
        assert_eq!(scopes.lookup(x).unwrap().slot, 2);
        scopes.pop_scope();
        assert_eq!(scopes.lookup(x).unwrap().slot, 1);
    }

    #[test]
    fn names_vanish_when_their_scope_ends() {
        let mut interner = Interner::new();
        let tmp = interner.intern("tmp");
        let mut scopes = ScopeStack::new();
        scopes.push_scope();
        scopes.declare(entry(tmp));
        assert!(scopes.lookup(tmp).is_some());
        scopes.pop_scope();
        assert!(scopes.lookup(tmp).is_none());
    }
}
