//! Name interning and source-span bookkeeping.
//!
//! [`Name`] is the `Symbol`/`Token` identifier currency used by every other
//! `cc-*` crate: two names are equal iff they came from the same [`Interner`]
//! and refer to the same entry, so comparison is a single integer compare
//! rather than a string compare.

use std::collections::HashMap;
use std::fmt;

/// An interned string. Cheap to copy, cheap to compare.
///
/// Equality is pointer-equality-after-interning: two `Name`s compare equal
/// iff they were produced by the same [`Interner`] for equal text.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Name(u32);

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

/// Grow-only string interning table.
///
/// Process-wide by convention but not by enforcement: every phase is handed
/// an explicit `&mut Interner` or `&Interner` rather than reaching for a
/// global, per the "no implicit globals" design note.
#[derive(Default)]
pub struct Interner {
    strings: Vec<Box<str>>,
    lookup: HashMap<Box<str>, Name>,
}

impl Interner {
    pub fn new() -> Self {
        Interner {
            strings: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Interns `s`, returning the existing [`Name`] if `s` was already seen.
    pub fn intern(&mut self, s: &str) -> Name {
        if let Some(&name) = self.lookup.get(s) {
            return name;
        }
        let name = Name(self.strings.len() as u32);
        let boxed: Box<str> = s.into();
        self.strings.push(boxed.clone());
        self.lookup.insert(boxed, name);
        name
    }

    /// Resolves a [`Name`] back to its text.
    ///
    /// Panics if `name` was not produced by this interner; that is an
    /// internal invariant violation, not a recoverable error.
    pub fn resolve(&self, name: Name) -> &str {
        &self.strings[name.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// A location in a source file, used to point diagnostics at exact text.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SourceLoc {
    pub file: Name,
    pub line: u32,
    pub col: u32,
}

impl SourceLoc {
    pub fn new(file: Name, line: u32, col: u32) -> Self {
        SourceLoc { file, line, col }
    }
}

/// A half-open byte range paired with the line/column of its first byte,
/// used to underline a token or AST node in a diagnostic.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    pub loc: SourceLoc,
    pub len: u32,
}

impl Span {
    pub fn new(loc: SourceLoc, len: u32) -> Self {
        Span { loc, len }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_dedups() {
        let mut interner = Interner::new();
        let a = interner.intern("foo");
        let b = interner.intern("foo");
        let c = interner.intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.resolve(a), "foo");
        assert_eq!(interner.resolve(c), "bar");
    }

    #[test]
    fn case_sensitive() {
        let mut interner = Interner::new();
        let a = interner.intern("Foo");
        let b = interner.intern("foo");
        assert_ne!(a, b);
    }
}
