//! Symbol tables and lexical scopes.

use std::collections::HashMap;
use std::rc::Rc;

use cc_interner::Name;

use crate::ty::Type;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StorageClass {
    None,
    Static,
    Extern,
    Typedef,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolKind {
    Local,
    Param,
    Global,
    Function,
    Typedef,
    EnumConst,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: Name,
    pub kind: SymbolKind,
    pub ty: Rc<Type>,
    pub storage: StorageClass,
    /// Offset from the frame base, assigned during IR building.
    pub frame_offset: i64,
    /// For `EnumConst`, its folded value.
    pub enum_value: i64,
}

pub struct Scope {
    pub vars: HashMap<Name, Symbol>,
    pub tags: HashMap<Name, Rc<Type>>,
    pub parent: Option<usize>,
}

/// An arena of scopes linked by parent index: indices into an arena-owned
/// vector rather than owning references, since scopes form a cyclic-ish
/// parent/child structure.
pub struct ScopeTree {
    scopes: Vec<Scope>,
    current: usize,
}

impl ScopeTree {
    pub fn new() -> Self {
        ScopeTree {
            scopes: vec![Scope { vars: HashMap::new(), tags: HashMap::new(), parent: None }],
            current: 0,
        }
    }

    pub fn push(&mut self) {
        let parent = self.current;
        self.scopes.push(Scope { vars: HashMap::new(), tags: HashMap::new(), parent: Some(parent) });
        self.current = self.scopes.len() - 1;
    }

    pub fn pop(&mut self) {
        self.current = self.scopes[self.current].parent.expect("popped root scope");
    }

    pub fn declare(&mut self, sym: Symbol) -> Result<(), Name> {
        let scope = &mut self.scopes[self.current];
        if scope.vars.contains_key(&sym.name) {
            return Err(sym.name);
        }
        scope.vars.insert(sym.name, sym);
        Ok(())
    }

    pub fn declare_in_same_scope(&self, name: Name) -> bool {
        self.scopes[self.current].vars.contains_key(&name)
    }

    pub fn lookup(&self, name: Name) -> Option<&Symbol> {
        let mut idx = Some(self.current);
        while let Some(i) = idx {
            if let Some(sym) = self.scopes[i].vars.get(&name) {
                return Some(sym);
            }
            idx = self.scopes[i].parent;
        }
        None
    }

    pub fn lookup_mut(&mut self, name: Name) -> Option<&mut Symbol> {
        let mut idx = Some(self.current);
        while let Some(i) = idx {
            if self.scopes[i].vars.contains_key(&name) {
                return self.scopes[i].vars.get_mut(&name);
            }
            idx = self.scopes[i].parent;
        }
        None
    }

    pub fn declare_tag(&mut self, name: Name, ty: Rc<Type>) {
        self.scopes[self.current].tags.insert(name, ty);
    }

    pub fn lookup_tag(&self, name: Name) -> Option<Rc<Type>> {
        let mut idx = Some(self.current);
        while let Some(i) = idx {
            if let Some(ty) = self.scopes[i].tags.get(&name) {
                return Some(ty.clone());
            }
            idx = self.scopes[i].parent;
        }
        None
    }

    pub fn is_global(&self) -> bool {
        self.current == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadowing_across_scopes() {
        let mut tree = ScopeTree::new();
        let n = Name::default();
        tree.declare(Symbol {
            name: n,
            kind: SymbolKind::Global,
            ty: Type::int(),
            storage: StorageClass::None,
            frame_offset: 0,
            enum_value: 0,
        })
        .unwrap();
        tree.push();
        tree.declare(Symbol {
            name: n,
            kind: SymbolKind::Local,
            ty: Type::long(),
            storage: StorageClass::None,
            frame_offset: -8,
            enum_value: 0,
        })
        .unwrap();
        assert_eq!(tree.lookup(n).unwrap().kind, SymbolKind::Local);
        tree.pop();
        assert_eq!(tree.lookup(n).unwrap().kind, SymbolKind::Global);
    }

    #[test]
    fn redeclaration_in_same_scope_errors() {
        let mut tree = ScopeTree::new();
        let n = Name::default();
        tree.declare(Symbol {
            name: n,
            kind: SymbolKind::Global,
            ty: Type::int(),
            storage: StorageClass::None,
            frame_offset: 0,
            enum_value: 0,
        })
        .unwrap();
        let err = tree.declare(Symbol {
            name: n,
            kind: SymbolKind::Global,
            ty: Type::int(),
            storage: StorageClass::None,
            frame_offset: 0,
            enum_value: 0,
        });
        assert!(err.is_err());
    }
}
