//! Macro definition storage and expansion.

use std::collections::HashMap;

use cc_interner::{Interner, Name};

use crate::scan::Scanner;
use crate::token::{Literal, Punct, Token, TokenKind};

#[derive(Clone)]
pub enum MacroDef {
    Object(Vec<Token>),
    Function {
        params: Vec<Name>,
        variadic: bool,
        body: Vec<Token>,
    },
}

#[derive(Default)]
pub struct MacroTable {
    defs: HashMap<Name, MacroDef>,
}

impl MacroTable {
    pub fn new() -> Self {
        MacroTable::default()
    }

    pub fn define(&mut self, name: Name, def: MacroDef) {
        self.defs.insert(name, def);
    }

    pub fn undef(&mut self, name: Name) {
        self.defs.remove(&name);
    }

    pub fn is_defined(&self, name: Name) -> bool {
        self.defs.contains_key(&name)
    }

    pub fn get(&self, name: Name) -> Option<&MacroDef> {
        self.defs.get(&name)
    }
}

fn token_text(tok: &Token, interner: &Interner) -> String {
    match &tok.kind {
        TokenKind::Ident(n) => interner.resolve(*n).to_string(),
        TokenKind::Literal(Literal::Int { value, .. }) => value.to_string(),
        TokenKind::Literal(Literal::Str(bytes)) => {
            format!("\"{}\"", String::from_utf8_lossy(bytes))
        }
        TokenKind::Literal(Literal::Char(c)) => format!("'{}'", *c as char),
        TokenKind::Literal(Literal::Float { value, .. }) => value.to_string(),
        TokenKind::Keyword(_) => String::new(),
        TokenKind::Punct(_) => String::new(),
        TokenKind::Eof => String::new(),
    }
}

fn stringize(toks: &[Token], interner: &Interner) -> String {
    toks.iter()
        .map(|t| token_text(t, interner))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Expands one function-like (or object-like, with empty `params`) macro
/// body by substituting `params`/`__VA_ARGS__` with `args`, handling `#`
/// stringize and `##` token paste.
pub fn substitute_params(
    body: &[Token],
    params: &[Name],
    args: &[Vec<Token>],
    variadic: bool,
    va_args_name: Name,
    interner: &mut Interner,
) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::new();
    let mut i = 0;
    while i < body.len() {
        let tok = &body[i];

        if let TokenKind::Punct(Punct::Hash) = tok.kind {
            if let Some(TokenKind::Ident(name)) = body.get(i + 1).map(|t| &t.kind) {
                if let Some(idx) = params.iter().position(|p| p == name) {
                    let text = stringize(&args[idx], interner);
                    out.push(Token::new(
                        TokenKind::Literal(Literal::Str(text.into_bytes())),
                        body[i].span,
                    ));
                    i += 2;
                    continue;
                }
            }
        }

        let substituted: Vec<Token> = if let TokenKind::Ident(name) = tok.kind {
            if let Some(idx) = params.iter().position(|p| *p == name) {
                args[idx].clone()
            } else if variadic && name == va_args_name {
                let mut joined = Vec::new();
                for (k, a) in args.iter().skip(params.len()).enumerate() {
                    if k > 0 {
                        joined.push(Token::new(TokenKind::Punct(Punct::Comma), tok.span));
                    }
                    joined.extend(a.clone());
                }
                joined
            } else {
                vec![tok.clone()]
            }
        } else {
            vec![tok.clone()]
        };

        out.extend(substituted);
        i += 1;
    }
    paste_adjacent(&out, interner)
}

/// Collapses `a ## b` into one token by re-lexing the concatenated text.
fn paste_adjacent(toks: &[Token], interner: &mut Interner) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::new();
    let mut i = 0;
    while i < toks.len() {
        if i + 2 < toks.len() {
            if let TokenKind::Punct(Punct::HashHash) = toks[i + 1].kind {
                let left = token_text(&toks[i], interner);
                let right = token_text(&toks[i + 2], interner);
                let pasted = format!("{left}{right}");
                let file = toks[i].span.loc.file;
                let mut scanner = Scanner::new(&pasted, file);
                let _ = scanner.skip_line_ws();
                if let Ok(mut tok) = scanner.next_token(interner) {
                    tok.span = toks[i].span;
                    out.push(tok);
                }
                i += 3;
                continue;
            }
        }
        out.push(toks[i].clone());
        i += 1;
    }
    out
}
