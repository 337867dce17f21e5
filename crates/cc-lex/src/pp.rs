//! Preprocessor driver: directives, conditional compilation, includes, and
//! macro expansion on top of the raw [`crate::scan::Scanner`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use cc_interner::{Interner, Name, SourceLoc, Span};
use log::{debug, trace};

use crate::error::{LexError, Result};
use crate::macro_table::{substitute_params, MacroDef, MacroTable};
use crate::pp_expr;
use crate::scan::Scanner;
use crate::token::{Literal, Punct, Token, TokenKind};

/// Config the driver passes down: `-I DIR`, `-D NAME[=VAL]`, `CC_INCLUDE`.
#[derive(Clone)]
pub struct PpConfig {
    pub include_dirs: Vec<PathBuf>,
    pub predefined: Vec<(String, String)>,
}

struct CondFrame {
    /// True if the current branch's tokens should be emitted.
    /// Whether the *enclosing* context allows this chain to emit at all.
    parent_taking: bool,
    /// Whether the currently active branch of this chain matched.
    branch_taken: bool,
    /// True once any branch in this `#if`/`#elif*`/`#else` chain has matched.
    taken_any: bool,
    #[allow(dead_code)]
    at: Span,
}

impl CondFrame {
    fn taking(&self) -> bool {
        self.parent_taking && self.branch_taken
    }
}

pub struct Preprocessor<'a> {
    interner: &'a mut Interner,
    macros: MacroTable,
    include_dirs: Vec<PathBuf>,
    /// Files that must only ever be read once (`#pragma once` or a detected
    /// include guard).
    once_files: HashSet<PathBuf>,
    seen_files: HashSet<PathBuf>,
    out: Vec<Token>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(interner: &'a mut Interner, config: PpConfig) -> Self {
        let mut macros = MacroTable::new();
        for (name, val) in &config.predefined {
            let n = interner.intern(name);
            let toks = if val.is_empty() {
                Vec::new()
            } else {
                lex_plain_line(val, n, interner)
            };
            macros.define(n, MacroDef::Object(toks));
        }
        Preprocessor {
            interner,
            macros,
            include_dirs: config.include_dirs,
            once_files: HashSet::new(),
            seen_files: HashSet::new(),
            out: Vec::new(),
        }
    }

    /// Preprocesses `path` (and everything it (transitively) `#include`s)
    /// into a single flat token stream ending in `Eof`.
    pub fn run(mut self, path: &Path) -> Result<Vec<Token>> {
        self.process_file(path)?;
        let eof_loc = SourceLoc::new(self.interner.intern(&path.display().to_string()), 0, 0);
        self.out.push(Token::new(TokenKind::Eof, Span::new(eof_loc, 0)));
        Ok(self.out)
    }

    fn process_file(&mut self, path: &Path) -> Result<()> {
        let canon = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if self.once_files.contains(&canon) {
            trace!("skipping already-included file {}", canon.display());
            return Ok(());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|_| LexError::FileNotFound(path.display().to_string()))?;
        debug!("preprocessing {}", path.display());
        let first_visit = self.seen_files.insert(canon.clone());
        let file_name = self.interner.intern(&path.display().to_string());
        let mut scanner = Scanner::new(&text, file_name);
        let mut conds: Vec<CondFrame> = Vec::new();
        // Heuristic include-guard detection: `#ifndef G` / `#define G` as the
        // file's very first two directives, with nothing but whitespace
        // before them and a matching `#endif` as the last directive.
        let mut guard_candidate: Option<Name> = None;
        let mut directive_count = 0u32;

        loop {
            let hit_newline = scanner.skip_line_ws()?;
            if scanner.at_eof() {
                break;
            }
            if hit_newline {
                scanner.bump_newline();
                continue;
            }
            if self.peek_is_hash(&scanner) {
                directive_count += 1;
                let is_first = directive_count == 1;
                if let Some(g) = self.process_directive(
                    &mut scanner,
                    path,
                    &mut conds,
                    is_first,
                )? {
                    guard_candidate = Some(g);
                }
                continue;
            }

            let taking = conds.last().map(|c| c.taking()).unwrap_or(true);
            if !taking {
                self.skip_rest_of_line(&mut scanner)?;
                continue;
            }
            let raw = self.lex_line(&mut scanner)?;
            self.expand_and_emit(&raw);
        }

        if !conds.is_empty() {
            return Err(LexError::MismatchedConditional(Span::new(
                SourceLoc::new(file_name, 0, 0),
                0,
            )));
        }

        if first_visit {
            if let Some(g) = guard_candidate {
                if self.macros.is_defined(g) {
                    self.once_files.insert(canon);
                }
            }
        }
        Ok(())
    }

    fn peek_is_hash(&self, scanner: &Scanner) -> bool {
        let mut tmp = scanner.clone_for_peek();
        matches!(tmp.peek_byte(), Some(b'#'))
    }

    fn skip_rest_of_line(&mut self, scanner: &mut Scanner) -> Result<()> {
        loop {
            let end = scanner.skip_line_ws()?;
            if end {
                scanner.bump_newline();
                return Ok(());
            }
            scanner.next_token(self.interner)?;
        }
    }

    fn lex_line(&mut self, scanner: &mut Scanner) -> Result<Vec<Token>> {
        let mut toks = Vec::new();
        loop {
            let end = scanner.skip_line_ws()?;
            if end {
                scanner.bump_newline();
                return Ok(toks);
            }
            toks.push(scanner.next_token(self.interner)?);
        }
    }

    fn process_directive(
        &mut self,
        scanner: &mut Scanner,
        cur_file: &Path,
        conds: &mut Vec<CondFrame>,
        is_first_directive: bool,
    ) -> Result<Option<Name>> {
        scanner.next_token(self.interner)?; // consume '#'
        scanner.skip_line_ws()?;
        let start = SourceLoc::new(self.interner.intern(&cur_file.display().to_string()), 0, 0);
        let name_tok = scanner.next_token(self.interner)?;
        let directive = match &name_tok.kind {
            TokenKind::Ident(n) => self.interner.resolve(*n).to_string(),
            TokenKind::Eof => return Ok(None), // stray '#' alone on a line: null directive
            _ => return Err(LexError::UnknownDirective("?".into(), Span::new(start, 0))),
        };

        let taking_outer = conds.last().map(|c| c.taking()).unwrap_or(true);

        macro_rules! rest_of_line_tokens {
            () => {{
                self.lex_line(scanner)?
            }};
        }

        let mut guard_name = None;

        match directive.as_str() {
            "include" if taking_outer => {
                let target = self.parse_include_target(scanner)?;
                let resolved = self.resolve_include(&target, cur_file)?;
                self.process_file(&resolved)?;
                let _ = rest_of_line_tokens!();
            }
            "include" => {
                self.skip_rest_of_line(scanner)?;
            }
            "define" if taking_outer => {
                self.parse_define(scanner)?;
                if is_first_directive {
                    // nothing; guard detection happens on the subsequent #ifndef/#define pair below
                }
            }
            "define" => {
                self.skip_rest_of_line(scanner)?;
            }
            "undef" if taking_outer => {
                let n = scanner.next_token(self.interner)?;
                if let TokenKind::Ident(name) = n.kind {
                    self.macros.undef(name);
                }
                let _ = rest_of_line_tokens!();
            }
            "undef" => {
                self.skip_rest_of_line(scanner)?;
            }
            "ifdef" | "ifndef" => {
                let n = scanner.next_token(self.interner)?;
                let defined = matches!(n.kind, TokenKind::Ident(name) if self.macros.is_defined(name));
                let want = directive == "ifdef";
                let branch_taken = defined == want;
                if directive == "ifndef" && is_first_directive {
                    if let TokenKind::Ident(name) = n.kind {
                        guard_name = Some(name);
                    }
                }
                conds.push(CondFrame {
                    parent_taking: taking_outer,
                    branch_taken,
                    taken_any: branch_taken,
                    at: Span::new(start, 0),
                });
                let _ = rest_of_line_tokens!();
            }
            "if" => {
                let line = rest_of_line_tokens!();
                let branch_taken = taking_outer && self.eval_condition(&line)?;
                conds.push(CondFrame {
                    parent_taking: taking_outer,
                    branch_taken,
                    taken_any: branch_taken,
                    at: Span::new(start, 0),
                });
            }
            "elif" => {
                let line = rest_of_line_tokens!();
                let (parent_taking, taken_any) = {
                    let frame = conds.last().ok_or(LexError::MismatchedConditional(Span::new(start, 0)))?;
                    (frame.parent_taking, frame.taken_any)
                };
                let branch_taken = if taken_any {
                    false
                } else {
                    parent_taking && self.eval_condition(&line)?
                };
                let frame = conds.last_mut().unwrap();
                frame.branch_taken = branch_taken;
                frame.taken_any = frame.taken_any || branch_taken;
            }
            "else" => {
                let frame = conds.last_mut().ok_or(LexError::MismatchedConditional(Span::new(start, 0)))?;
                frame.branch_taken = !frame.taken_any;
                frame.taken_any = true;
                self.skip_rest_of_line(scanner)?;
            }
            "endif" => {
                conds.pop().ok_or(LexError::MismatchedConditional(Span::new(start, 0)))?;
                self.skip_rest_of_line(scanner)?;
            }
            "line" if taking_outer => {
                let _ = rest_of_line_tokens!();
            }
            "line" => {
                self.skip_rest_of_line(scanner)?;
            }
            "pragma" if taking_outer => {
                let line = rest_of_line_tokens!();
                if let Some(TokenKind::Ident(n)) = line.first().map(|t| &t.kind) {
                    if self.interner.resolve(*n) == "once" {
                        let canon = cur_file.canonicalize().unwrap_or_else(|_| cur_file.to_path_buf());
                        self.once_files.insert(canon);
                    }
                }
            }
            "pragma" => {
                self.skip_rest_of_line(scanner)?;
            }
            "error" if taking_outer => {
                let line = rest_of_line_tokens!();
                let msg = line
                    .iter()
                    .map(|t| format!("{:?}", t.kind))
                    .collect::<Vec<_>>()
                    .join(" ");
                return Err(LexError::UserError(msg, Span::new(start, 0)));
            }
            "error" => {
                self.skip_rest_of_line(scanner)?;
            }
            "warning" if taking_outer => {
                let _ = rest_of_line_tokens!();
            }
            "warning" => {
                self.skip_rest_of_line(scanner)?;
            }
            other if !taking_outer => {
                let _ = other;
                self.skip_rest_of_line(scanner)?;
            }
            other => {
                return Err(LexError::UnknownDirective(other.to_string(), Span::new(start, 0)));
            }
        }
        Ok(guard_name)
    }

    fn eval_condition(&mut self, line: &[Token]) -> Result<bool> {
        let resolved = pp_expr::resolve_defined(line, &self.macros, &*self.interner);
        let expanded = self.expand_tokens(&resolved);
        let v = pp_expr::eval(&expanded, &self.macros, &*self.interner)?;
        Ok(v != 0)
    }

    fn parse_include_target(&mut self, scanner: &mut Scanner) -> Result<String> {
        scanner.skip_line_ws()?;
        match scanner.peek_byte_pub() {
            Some(b'<') => {
                let mut s = String::new();
                scanner.consume_byte();
                loop {
                    match scanner.consume_byte() {
                        Some(b'>') | None => break,
                        Some(c) => s.push(c as char),
                    }
                }
                Ok(format!("<{s}"))
            }
            _ => {
                let tok = scanner.next_token(self.interner)?;
                if let TokenKind::Literal(Literal::Str(bytes)) = tok.kind {
                    Ok(format!("\"{}", String::from_utf8_lossy(&bytes)))
                } else {
                    Err(LexError::UnknownDirective("include".into(), tok.span))
                }
            }
        }
    }

    fn resolve_include(&self, target: &str, cur_file: &Path) -> Result<PathBuf> {
        let (angled, name) = (target.starts_with('<'), &target[1..]);
        if !angled {
            if let Some(parent) = cur_file.parent() {
                let candidate = parent.join(name);
                if candidate.exists() {
                    return Ok(candidate);
                }
            }
        }
        for dir in &self.include_dirs {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(LexError::FileNotFound(name.to_string()))
    }

    fn parse_define(&mut self, scanner: &mut Scanner) -> Result<()> {
        let name_tok = scanner.next_token(self.interner)?;
        let name = match name_tok.kind {
            TokenKind::Ident(n) => n,
            _ => return Err(LexError::UnknownDirective("define".into(), name_tok.span)),
        };
        if scanner.peek_byte_pub() == Some(b'(') {
            scanner.consume_byte();
            let mut params = Vec::new();
            let mut variadic = false;
            loop {
                scanner.skip_line_ws()?;
                if scanner.peek_byte_pub() == Some(b')') {
                    scanner.consume_byte();
                    break;
                }
                let t = scanner.next_token(self.interner)?;
                match t.kind {
                    TokenKind::Ident(p) => params.push(p),
                    TokenKind::Punct(Punct::Ellipsis) => variadic = true,
                    _ => {}
                }
                scanner.skip_line_ws()?;
                if scanner.peek_byte_pub() == Some(b',') {
                    scanner.consume_byte();
                }
            }
            let body = self.lex_line(scanner)?;
            self.macros.define(name, MacroDef::Function { params, variadic, body });
        } else {
            let body = self.lex_line(scanner)?;
            self.macros.define(name, MacroDef::Object(body));
        }
        Ok(())
    }

    fn expand_and_emit(&mut self, line: &[Token]) {
        let expanded = self.expand_tokens(line);
        self.out.extend(expanded);
    }

    /// Repeatedly rescans `tokens`, expanding macro invocations, honoring
    /// the painted-blue rule via each token's `expansion_trail`.
    fn expand_tokens(&mut self, tokens: &[Token]) -> Vec<Token> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let tok = &tokens[i];
            if let TokenKind::Ident(name) = tok.kind {
                if !tok.expansion_trail.contains(&name) {
                    if let Some(def) = self.macros.get(name).cloned() {
                        match def {
                            MacroDef::Object(body) => {
                                let expanded = self.expand_body(&body, name, &tok.expansion_trail);
                                let rescanned = self.expand_tokens(&expanded);
                                out.extend(rescanned);
                                i += 1;
                                continue;
                            }
                            MacroDef::Function { params, variadic, body } => {
                                if matches!(
                                    tokens.get(i + 1).map(|t| &t.kind),
                                    Some(TokenKind::Punct(Punct::LParen))
                                ) {
                                    let (args, consumed) = self.collect_args(&tokens[i + 1..]);
                                    let va_args = self.interner.intern("__VA_ARGS__");
                                    let substituted = substitute_params(
                                        &body, &params, &args, variadic, va_args, self.interner,
                                    );
                                    let expanded = self.expand_body(&substituted, name, &tok.expansion_trail);
                                    let rescanned = self.expand_tokens(&expanded);
                                    out.extend(rescanned);
                                    i += 1 + consumed;
                                    continue;
                                }
                            }
                        }
                    }
                }
            }
            out.push(tok.clone());
            i += 1;
        }
        out
    }

    fn expand_body(&self, body: &[Token], painted: Name, trail: &[Name]) -> Vec<Token> {
        body.iter()
            .map(|t| {
                let mut nt = t.clone();
                nt.expansion_trail = trail.to_vec();
                nt.expansion_trail.push(painted);
                nt
            })
            .collect()
    }

    /// Splits a `(a, b, c)` argument list on top-level commas, for
    /// function-like macro invocations. `rest` starts at the opening `(`.
    fn collect_args(&self, rest: &[Token]) -> (Vec<Vec<Token>>, usize) {
        let mut depth = 0i32;
        let mut args: Vec<Vec<Token>> = vec![Vec::new()];
        let mut i = 1; // skip '('
        loop {
            if i >= rest.len() {
                break;
            }
            match &rest[i].kind {
                TokenKind::Punct(Punct::LParen) => {
                    depth += 1;
                    args.last_mut().unwrap().push(rest[i].clone());
                }
                TokenKind::Punct(Punct::RParen) => {
                    if depth == 0 {
                        i += 1;
                        break;
                    }
                    depth -= 1;
                    args.last_mut().unwrap().push(rest[i].clone());
                }
                TokenKind::Punct(Punct::Comma) if depth == 0 => {
                    args.push(Vec::new());
                }
                _ => {
                    args.last_mut().unwrap().push(rest[i].clone());
                }
            }
            i += 1;
        }
        if args.len() == 1 && args[0].is_empty() {
            args.clear();
        }
        (args, i)
    }
}

fn lex_plain_line(text: &str, file: Name, interner: &mut Interner) -> Vec<Token> {
    let mut scanner = Scanner::new(text, file);
    let mut toks = Vec::new();
    loop {
        match scanner.skip_line_ws() {
            Ok(true) | Err(_) => break,
            Ok(false) => {}
        }
        match scanner.next_token(interner) {
            Ok(t) if matches!(t.kind, TokenKind::Eof) => break,
            Ok(t) => toks.push(t),
            Err(_) => break,
        }
    }
    toks
}
