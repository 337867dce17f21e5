//! Integer constant-expression evaluator for `#if`/`#elif`, supporting
//! `defined(NAME)`.

use cc_interner::Interner;

use crate::error::{LexError, Result};
use crate::macro_table::MacroTable;
use crate::token::{Literal, Punct, Token, TokenKind};

/// Evaluates a already-macro-expanded (except `defined`) token slice as a
/// C integer constant expression, per the grammar's precedence levels
/// restricted to operators valid in preprocessor expressions.
pub fn eval(tokens: &[Token], macros: &MacroTable, interner: &Interner) -> Result<i128> {
    // `defined NAME` / `defined(NAME)` must be resolved before macro
    // expansion replaces `NAME`; callers pre-resolve those via `resolve_defined`.
    let mut p = Parser { toks: tokens, pos: 0, macros, interner };
    let v = p.conditional()?;
    Ok(v)
}

/// Rewrites `defined NAME` / `defined(NAME)` into integer literals 0/1 in
/// place, before macro expansion runs on the rest of the line (spec: the
/// operand of `defined` must not itself be macro-expanded).
pub fn resolve_defined(tokens: &[Token], macros: &MacroTable, interner: &Interner) -> Vec<Token> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if let TokenKind::Ident(name) = &tokens[i].kind {
            if interner.resolve(*name) == "defined" {
                let (defined, consumed) = if matches!(
                    tokens.get(i + 1).map(|t| &t.kind),
                    Some(TokenKind::Punct(Punct::LParen))
                ) {
                    let target = tokens.get(i + 2);
                    let defined = matches!(target.map(|t| &t.kind), Some(TokenKind::Ident(n)) if macros.is_defined(*n));
                    (defined, 4)
                } else {
                    let target = tokens.get(i + 1);
                    let defined = matches!(target.map(|t| &t.kind), Some(TokenKind::Ident(n)) if macros.is_defined(*n));
                    (defined, 2)
                };
                out.push(Token::new(
                    TokenKind::Literal(Literal::Int { value: defined as i128, unsigned: false, long: false }),
                    tokens[i].span,
                ));
                i += consumed;
                continue;
            }
        }
        out.push(tokens[i].clone());
        i += 1;
    }
    out
}

struct Parser<'a> {
    toks: &'a [Token],
    pos: usize,
    #[allow(dead_code)]
    macros: &'a MacroTable,
    interner: &'a Interner,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&TokenKind> {
        self.toks.get(self.pos).map(|t| &t.kind)
    }

    fn bump(&mut self) -> Option<&TokenKind> {
        let t = self.toks.get(self.pos).map(|t| &t.kind);
        self.pos += 1;
        t
    }

    fn punct(&self) -> Option<Punct> {
        match self.peek() {
            Some(TokenKind::Punct(p)) => Some(*p),
            _ => None,
        }
    }

    fn conditional(&mut self) -> Result<i128> {
        let c = self.or()?;
        if self.punct() == Some(Punct::Question) {
            self.bump();
            let t = self.conditional()?;
            if self.punct() != Some(Punct::Colon) {
                return Err(eof_err());
            }
            self.bump();
            let f = self.conditional()?;
            Ok(if c != 0 { t } else { f })
        } else {
            Ok(c)
        }
    }

    fn or(&mut self) -> Result<i128> {
        let mut v = self.and()?;
        while self.punct() == Some(Punct::OrOr) {
            self.bump();
            let r = self.and()?;
            v = ((v != 0) || (r != 0)) as i128;
        }
        Ok(v)
    }

    fn and(&mut self) -> Result<i128> {
        let mut v = self.bitor()?;
        while self.punct() == Some(Punct::AndAnd) {
            self.bump();
            let r = self.bitor()?;
            v = ((v != 0) && (r != 0)) as i128;
        }
        Ok(v)
    }

    fn bitor(&mut self) -> Result<i128> {
        let mut v = self.bitxor()?;
        while self.punct() == Some(Punct::Pipe) {
            self.bump();
            v |= self.bitxor()?;
        }
        Ok(v)
    }

    fn bitxor(&mut self) -> Result<i128> {
        let mut v = self.bitand()?;
        while self.punct() == Some(Punct::Caret) {
            self.bump();
            v ^= self.bitand()?;
        }
        Ok(v)
    }

    fn bitand(&mut self) -> Result<i128> {
        let mut v = self.eq()?;
        while self.punct() == Some(Punct::Amp) {
            self.bump();
            v &= self.eq()?;
        }
        Ok(v)
    }

    fn eq(&mut self) -> Result<i128> {
        let mut v = self.rel()?;
        loop {
            match self.punct() {
                Some(Punct::Eq) => {
                    self.bump();
                    v = (v == self.rel()?) as i128;
                }
                Some(Punct::Ne) => {
                    self.bump();
                    v = (v != self.rel()?) as i128;
                }
                _ => return Ok(v),
            }
        }
    }

    fn rel(&mut self) -> Result<i128> {
        let mut v = self.shift()?;
        loop {
            match self.punct() {
                Some(Punct::Lt) => {
                    self.bump();
                    v = (v < self.shift()?) as i128;
                }
                Some(Punct::Gt) => {
                    self.bump();
                    v = (v > self.shift()?) as i128;
                }
                Some(Punct::Le) => {
                    self.bump();
                    v = (v <= self.shift()?) as i128;
                }
                Some(Punct::Ge) => {
                    self.bump();
                    v = (v >= self.shift()?) as i128;
                }
                _ => return Ok(v),
            }
        }
    }

    fn shift(&mut self) -> Result<i128> {
        let mut v = self.add()?;
        loop {
            match self.punct() {
                Some(Punct::Shl) => {
                    self.bump();
                    v <<= self.add()?;
                }
                Some(Punct::Shr) => {
                    self.bump();
                    v >>= self.add()?;
                }
                _ => return Ok(v),
            }
        }
    }

    fn add(&mut self) -> Result<i128> {
        let mut v = self.mul()?;
        loop {
            match self.punct() {
                Some(Punct::Plus) => {
                    self.bump();
                    v += self.mul()?;
                }
                Some(Punct::Minus) => {
                    self.bump();
                    v -= self.mul()?;
                }
                _ => return Ok(v),
            }
        }
    }

    fn mul(&mut self) -> Result<i128> {
        let mut v = self.unary()?;
        loop {
            match self.punct() {
                Some(Punct::Star) => {
                    self.bump();
                    v *= self.unary()?;
                }
                Some(Punct::Slash) => {
                    self.bump();
                    let r = self.unary()?;
                    v = if r == 0 { 0 } else { v / r };
                }
                Some(Punct::Percent) => {
                    self.bump();
                    let r = self.unary()?;
                    v = if r == 0 { 0 } else { v % r };
                }
                _ => return Ok(v),
            }
        }
    }

    fn unary(&mut self) -> Result<i128> {
        match self.punct() {
            Some(Punct::Minus) => {
                self.bump();
                Ok(-self.unary()?)
            }
            Some(Punct::Bang) => {
                self.bump();
                Ok((self.unary()? == 0) as i128)
            }
            Some(Punct::Tilde) => {
                self.bump();
                Ok(!self.unary()?)
            }
            Some(Punct::Plus) => {
                self.bump();
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<i128> {
        match self.bump().cloned() {
            Some(TokenKind::Literal(Literal::Int { value, .. })) => Ok(value),
            Some(TokenKind::Literal(Literal::Char(c))) => Ok(c as i128),
            Some(TokenKind::Punct(Punct::LParen)) => {
                let v = self.conditional()?;
                if self.punct() != Some(Punct::RParen) {
                    return Err(eof_err());
                }
                self.bump();
                Ok(v)
            }
            // Any identifier surviving macro expansion (i.e. undefined) is 0,
            // per the standard "undefined identifiers evaluate to 0" rule.
            Some(TokenKind::Ident(_)) => Ok(0),
            _ => {
                let _ = self.interner;
                Err(eof_err())
            }
        }
    }
}

fn eof_err() -> LexError {
    LexError::MalformedIfExpr
}
