//! C recursive-descent parser and semantic analyzer (component C2).
//!
//! [`parse`] is the component's whole public contract: given an already
//! macro-expanded [`Token`] stream, produce a typed [`TranslationUnit`] or
//! the first [`ParseError`] encountered.

mod ast;
mod error;
mod parser;
mod scope;
mod ty;

pub use ast::*;
pub use error::{ParseError, Result};
pub use parser::Parser;
pub use scope::{Scope, StorageClass, Symbol, SymbolKind};
pub use ty::{usual_arith_conv, promote, Member, Type};

use std::rc::Rc;

use cc_interner::Interner;
use cc_lex::Token;

/// Parses a fully preprocessed token stream into a typed translation unit,
/// along with the string literals collected along the way (their final
/// placement into `.rodata` is the assembler's job).
pub fn parse(toks: &[Token], interner: &mut Interner) -> Result<(TranslationUnit, Vec<Rc<Vec<u8>>>)> {
    Parser::new(toks, interner).parse_translation_unit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_lex::{lex_file, PpConfig};
    use std::io::Write;

    fn parse_str(src: &str) -> (TranslationUnit, Interner) {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("cc_parse_test_{:x}.c", src.len() as u32 ^ 0x5bd1e995));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(src.as_bytes()).unwrap();
        let mut interner = Interner::new();
        let config = PpConfig { include_dirs: vec![], predefined: vec![] };
        let toks = lex_file(&path, &mut interner, config).unwrap();
        std::fs::remove_file(&path).ok();
        let (tu, _strs) = parse(&toks, &mut interner).unwrap();
        (tu, interner)
    }

    #[test]
    fn parses_simple_arithmetic_function() {
        let (tu, _) = parse_str("int main() { return 5 + 6 * 7; }");
        assert_eq!(tu.functions.len(), 1);
        let body = tu.functions[0].body.as_ref().unwrap();
        match body {
            Stmt::Block(stmts) => assert_eq!(stmts.len(), 1),
            _ => panic!("expected block"),
        }
    }

    #[test]
    fn constant_folds_arithmetic_at_parse_time() {
        let (tu, _) = parse_str("int main() { return 5 + 6 * 7; }");
        let body = tu.functions[0].body.as_ref().unwrap();
        let Stmt::Block(stmts) = body else { panic!() };
        let Stmt::Return(Some(e)) = &stmts[0] else { panic!("expected return") };
        assert!(matches!(e.kind, ExprKind::IntLit(47)));
    }

    #[test]
    fn switch_with_fallthrough_cases() {
        let (tu, _) = parse_str(
            "int f(int x) { switch (x) { case 1: case 2: return 1; default: return 0; } }",
        );
        let body = tu.functions[0].body.as_ref().unwrap();
        let Stmt::Block(stmts) = body else { panic!() };
        assert!(matches!(stmts[0], Stmt::Switch { .. }));
    }

    #[test]
    fn duplicate_case_is_rejected() {
        let dir = std::env::temp_dir();
        let path = dir.join("cc_parse_test_dup_case.c");
        std::fs::write(&path, "int f(int x){switch(x){case 1: return 1; case 1: return 2;}}").unwrap();
        let mut interner = Interner::new();
        let config = PpConfig { include_dirs: vec![], predefined: vec![] };
        let toks = lex_file(&path, &mut interner, config).unwrap();
        std::fs::remove_file(&path).ok();
        let err = parse(&toks, &mut interner);
        assert!(matches!(err, Err(ParseError::DuplicateCase(_))));
    }

    #[test]
    fn pointer_and_array_decay_in_expressions() {
        let (tu, _) = parse_str("int f(int *p) { return p[0] + *(p + 1); }");
        assert_eq!(tu.functions.len(), 1);
    }

    #[test]
    fn struct_field_layout_has_correct_offsets() {
        let (tu, _) = parse_str("struct S { char a; int b; }; int f() { struct S s; return s.b; }");
        let body = tu.functions[0].body.as_ref().unwrap();
        let Stmt::Block(stmts) = body else { panic!() };
        let Stmt::Return(Some(e)) = &stmts[1] else { panic!("expected return") };
        match &e.kind {
            ExprKind::Member { offset, .. } => assert_eq!(*offset, 4),
            other => panic!("expected member access, got {other:?}"),
        }
    }

    #[test]
    fn undeclared_identifier_is_an_error() {
        let dir = std::env::temp_dir();
        let path = dir.join("cc_parse_test_undeclared.c");
        std::fs::write(&path, "int f() { return nosuch; }").unwrap();
        let mut interner = Interner::new();
        let config = PpConfig { include_dirs: vec![], predefined: vec![] };
        let toks = lex_file(&path, &mut interner, config).unwrap();
        std::fs::remove_file(&path).ok();
        let err = parse(&toks, &mut interner);
        assert!(matches!(err, Err(ParseError::Undeclared(_))));
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let dir = std::env::temp_dir();
        let path = dir.join("cc_parse_test_break.c");
        std::fs::write(&path, "int f() { break; }").unwrap();
        let mut interner = Interner::new();
        let config = PpConfig { include_dirs: vec![], predefined: vec![] };
        let toks = lex_file(&path, &mut interner, config).unwrap();
        std::fs::remove_file(&path).ok();
        let err = parse(&toks, &mut interner);
        assert!(matches!(err, Err(ParseError::BreakContinueOutsideLoop(_))));
    }
}
