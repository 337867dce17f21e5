//! Recursive-descent parser + inline semantic analysis (component C2).
//!
//! Like the corpus's own compiler front ends, type-checking happens as each
//! node is built rather than as a separate pass over an untyped tree: every
//! `parse_*` method below returns an already-typed [`Expr`]/[`Stmt`].

use std::collections::HashMap;
use std::rc::Rc;

use cc_interner::{Interner, Name, Span};
use log::trace;

use cc_lex::{Keyword, Literal, Punct, Token, TokenKind};

use crate::ast::*;
use crate::error::{ParseError, Result};
use crate::scope::{ScopeTree, StorageClass, Symbol, SymbolKind};
use crate::ty::{usual_arith_conv, Member, Type};

pub struct Parser<'a> {
    toks: &'a [Token],
    pos: usize,
    interner: &'a mut Interner,
    scopes: ScopeTree,
    typedefs_seen: HashMap<Name, Rc<Type>>,
    loop_depth: u32,
    switch_depth: u32,
    /// Stack of in-progress switch case-value sets, for duplicate detection.
    switch_cases: Vec<Vec<i128>>,
    next_local_offset: i64,
    string_literals: Vec<Rc<Vec<u8>>>,
}

impl<'a> Parser<'a> {
    pub fn new(toks: &'a [Token], interner: &'a mut Interner) -> Self {
        Parser {
            toks,
            pos: 0,
            interner,
            scopes: ScopeTree::new(),
            typedefs_seen: HashMap::new(),
            loop_depth: 0,
            switch_depth: 0,
            switch_cases: Vec::new(),
            next_local_offset: 0,
            string_literals: Vec::new(),
        }
    }

    fn cur(&self) -> &TokenKind {
        &self.toks[self.pos.min(self.toks.len() - 1)].kind
    }

    fn cur_span(&self) -> Span {
        self.toks[self.pos.min(self.toks.len() - 1)].span
    }

    fn at_eof(&self) -> bool {
        matches!(self.cur(), TokenKind::Eof)
    }

    fn bump(&mut self) -> TokenKind {
        let k = self.toks[self.pos.min(self.toks.len() - 1)].kind.clone();
        if self.pos < self.toks.len() - 1 {
            self.pos += 1;
        }
        k
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if matches!(self.cur(), TokenKind::Punct(x) if *x == p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: Punct, what: &'static str) -> Result<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(ParseError::Expected(what, self.cur_span()))
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if matches!(self.cur(), TokenKind::Keyword(k) if *k == kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<Name> {
        match self.cur().clone() {
            TokenKind::Ident(n) => {
                self.bump();
                Ok(n)
            }
            _ => Err(ParseError::Expected("identifier", self.cur_span())),
        }
    }

    // ---------------------------------------------------------------
    // Top level
    // ---------------------------------------------------------------

    pub fn parse_translation_unit(mut self) -> Result<(TranslationUnit, Vec<Rc<Vec<u8>>>)> {
        let mut functions = Vec::new();
        let mut globals = Vec::new();
        while !self.at_eof() {
            let (base, storage) = self.parse_decl_specifiers()?;
            if self.eat_punct(Punct::Semi) {
                continue; // `struct Foo;` forward-decl-only statement
            }
            loop {
                let (name, ty) = self.parse_declarator(base.clone())?;
                if storage == StorageClass::Typedef {
                    self.typedefs_seen.insert(name, ty.clone());
                    self.scopes
                        .declare(Symbol {
                            name,
                            kind: SymbolKind::Typedef,
                            ty: ty.clone(),
                            storage,
                            frame_offset: 0,
                            enum_value: 0,
                        })
                        .ok();
                } else if ty.is_function() && matches!(self.cur(), TokenKind::Punct(Punct::LBrace)) {
                    let f = self.parse_function_def(name, ty, storage)?;
                    functions.push(f);
                    break;
                } else {
                    let init = if self.eat_punct(Punct::Assign) {
                        Some(self.parse_initializer(&ty)?)
                    } else {
                        None
                    };
                    self.scopes
                        .declare(Symbol {
                            name,
                            kind: SymbolKind::Global,
                            ty: ty.clone(),
                            storage,
                            frame_offset: 0,
                            enum_value: 0,
                        })
                        .ok();
                    globals.push(Global {
                        name,
                        ty: ty.clone(),
                        init,
                        is_static: storage == StorageClass::Static,
                        is_extern: storage == StorageClass::Extern,
                    });
                }
                if ty.is_function() {
                    break;
                }
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::Semi, ";")?;
        }
        Ok((TranslationUnit { functions, globals }, self.string_literals))
    }

    fn parse_function_def(&mut self, name: Name, ty: Rc<Type>, storage: StorageClass) -> Result<Function> {
        let (ret, params, variadic) = match ty.as_ref() {
            Type::Function { ret, params, variadic } => (ret.clone(), params.clone(), *variadic),
            _ => unreachable!(),
        };
        self.scopes
            .declare(Symbol {
                name,
                kind: SymbolKind::Function,
                ty: ty.clone(),
                storage,
                frame_offset: 0,
                enum_value: 0,
            })
            .ok();
        self.scopes.push();
        self.next_local_offset = 0;
        let mut param_decls = Vec::new();
        for (i, pty) in params.iter().enumerate() {
            let pname = self.interner.intern(&format!("__param{i}"));
            param_decls.push(Declarator {
                name: pname,
                ty: pty.clone(),
                init: None,
                storage: StorageClass::None,
                frame_offset: 0,
            });
        }
        let body = self.parse_block()?;
        self.scopes.pop();
        let _ = ret;
        Ok(Function { name, ty, params: param_decls, body: Some(body), is_static: storage == StorageClass::Static, is_variadic: variadic })
    }

    // ---------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------

    fn is_type_start(&self) -> bool {
        match self.cur() {
            TokenKind::Keyword(k) => matches!(
                k,
                Keyword::Int
                    | Keyword::Char
                    | Keyword::Short
                    | Keyword::Long
                    | Keyword::Signed
                    | Keyword::Unsigned
                    | Keyword::Void
                    | Keyword::Float
                    | Keyword::Double
                    | Keyword::Struct
                    | Keyword::Union
                    | Keyword::Enum
                    | Keyword::Typedef
                    | Keyword::Static
                    | Keyword::Extern
                    | Keyword::Const
            ),
            TokenKind::Ident(n) => self.typedefs_seen.contains_key(n),
            _ => false,
        }
    }

    fn parse_decl_specifiers(&mut self) -> Result<(Rc<Type>, StorageClass)> {
        let mut storage = StorageClass::None;
        let mut signed = None;
        let mut unsigned = false;
        let mut long_count = 0;
        let mut short = false;
        let mut base: Option<Rc<Type>> = None;

        loop {
            match self.cur().clone() {
                TokenKind::Keyword(Keyword::Static) => {
                    storage = StorageClass::Static;
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Extern) => {
                    storage = StorageClass::Extern;
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Typedef) => {
                    storage = StorageClass::Typedef;
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Const) => {
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Void) => {
                    base = Some(Type::void());
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Float) => {
                    base = Some(Type::float());
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Double) => {
                    base = Some(Type::double());
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Char) => {
                    base = Some(Type::char());
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Short) => {
                    short = true;
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Int) => {
                    if base.is_none() {
                        base = Some(Type::int());
                    }
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Long) => {
                    long_count += 1;
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Signed) => {
                    signed = Some(true);
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Unsigned) => {
                    unsigned = true;
                    signed = Some(false);
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Struct) | TokenKind::Keyword(Keyword::Union) => {
                    base = Some(self.parse_struct_union()?);
                }
                TokenKind::Keyword(Keyword::Enum) => {
                    base = Some(self.parse_enum()?);
                }
                TokenKind::Ident(n) if base.is_none() && self.typedefs_seen.contains_key(&n) => {
                    base = self.typedefs_seen.get(&n).cloned();
                    self.bump();
                }
                _ => break,
            }
        }

        let ty = if let Some(b) = base {
            b
        } else if short {
            Type::short()
        } else if long_count >= 2 {
            if unsigned { Type::ulong() } else { Type::long() }
        } else if long_count == 1 {
            if unsigned { Type::ulong() } else { Type::long() }
        } else if unsigned {
            Type::uint()
        } else {
            Type::int()
        };
        let ty = if short && unsigned {
            Rc::new(Type::Int { signed: false, width: 2 })
        } else {
            ty
        };
        let _ = signed;
        Ok((ty, storage))
    }

    fn parse_struct_union(&mut self) -> Result<Rc<Type>> {
        let is_union = matches!(self.cur(), TokenKind::Keyword(Keyword::Union));
        self.bump();
        let tag = if let TokenKind::Ident(n) = self.cur().clone() {
            self.bump();
            Some(n)
        } else {
            None
        };
        if !self.eat_punct(Punct::LBrace) {
            // reference to a previously declared tag
            if let Some(n) = tag {
                if let Some(ty) = self.scopes.lookup_tag(n) {
                    return Ok(ty);
                }
            }
            return Ok(Rc::new(Type::Struct {
                tag,
                members: Rc::new(Vec::new()),
                size: 0,
                align: 1,
                is_union,
            }));
        }
        let mut members = Vec::new();
        let mut offset = 0u64;
        let mut align = 1u64;
        while !self.eat_punct(Punct::RBrace) {
            let (base, _) = self.parse_decl_specifiers()?;
            loop {
                let (name, ty) = self.parse_declarator(base.clone())?;
                let msize = ty.size();
                let malign = ty.align();
                align = align.max(malign);
                if is_union {
                    members.push(Member { name, ty, offset: 0 });
                } else {
                    offset = (offset + malign - 1) / malign * malign;
                    members.push(Member { name, ty, offset });
                    offset += msize;
                }
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::Semi, ";")?;
        }
        let size = if is_union {
            members.iter().map(|m| m.ty.size()).max().unwrap_or(0)
        } else {
            (offset + align - 1) / align * align
        };
        let ty = Rc::new(Type::Struct { tag, members: Rc::new(members), size: size.max(1), align, is_union });
        if let Some(n) = tag {
            self.scopes.declare_tag(n, ty.clone());
        }
        Ok(ty)
    }

    fn parse_enum(&mut self) -> Result<Rc<Type>> {
        self.bump();
        let tag = if let TokenKind::Ident(n) = self.cur().clone() {
            self.bump();
            Some(n)
        } else {
            None
        };
        if self.eat_punct(Punct::LBrace) {
            let mut value = 0i64;
            while !self.eat_punct(Punct::RBrace) {
                let name = self.ident()?;
                if self.eat_punct(Punct::Assign) {
                    let e = self.parse_assignment()?;
                    if let ExprKind::IntLit(v) = e.kind {
                        value = v as i64;
                    }
                }
                self.scopes
                    .declare(Symbol {
                        name,
                        kind: SymbolKind::EnumConst,
                        ty: Type::int(),
                        storage: StorageClass::None,
                        frame_offset: 0,
                        enum_value: value,
                    })
                    .ok();
                value += 1;
                if !self.eat_punct(Punct::Comma) {
                    continue;
                }
            }
        }
        let ty = Rc::new(Type::Enum { tag });
        if let Some(n) = tag {
            self.scopes.declare_tag(n, ty.clone());
        }
        Ok(ty)
    }

    /// Parses one declarator: pointer-stars, then a name-or-paren core,
    /// then postfix `[]`/`()` operators, applying a stack of type operators
    /// to `base` right-to-left.
    fn parse_declarator(&mut self, base: Rc<Type>) -> Result<(Name, Rc<Type>)> {
        let mut ty = base;
        while self.eat_punct(Punct::Star) {
            while self.eat_keyword(Keyword::Const) {}
            ty = Type::pointer_to(ty);
        }
        if self.eat_punct(Punct::LParen) {
            // A parenthesized inner declarator: parse with a placeholder
            // base, then splice the real base in once we know the postfix chain.
            let placeholder = Type::void();
            let (name, inner) = self.parse_declarator(placeholder)?;
            self.expect_punct(Punct::RParen, ")")?;
            let outer = self.parse_type_suffix(ty)?;
            return Ok((name, splice_base(&inner, &outer)));
        }
        let name = self.ident()?;
        ty = self.parse_type_suffix(ty)?;
        Ok((name, ty))
    }

    fn parse_type_suffix(&mut self, base: Rc<Type>) -> Result<Rc<Type>> {
        if self.eat_punct(Punct::LBracket) {
            let len = if matches!(self.cur(), TokenKind::Punct(Punct::RBracket)) {
                None
            } else {
                let e = self.parse_assignment()?;
                match e.kind {
                    ExprKind::IntLit(v) => Some(v as u64),
                    _ => None,
                }
            };
            self.expect_punct(Punct::RBracket, "]")?;
            let elem = self.parse_type_suffix(base)?;
            return Ok(Rc::new(Type::Array { elem, len }));
        }
        if self.eat_punct(Punct::LParen) {
            let mut params = Vec::new();
            let mut variadic = false;
            if !matches!(self.cur(), TokenKind::Punct(Punct::RParen)) {
                loop {
                    if self.eat_punct(Punct::Ellipsis) {
                        variadic = true;
                        break;
                    }
                    if matches!(self.cur(), TokenKind::Keyword(Keyword::Void))
                        && matches!(self.peek_kind(1), TokenKind::Punct(Punct::RParen))
                    {
                        self.bump();
                        break;
                    }
                    let (pbase, _) = self.parse_decl_specifiers()?;
                    let ty = if matches!(self.cur(), TokenKind::Punct(Punct::Comma) | TokenKind::Punct(Punct::RParen)) {
                        pbase
                    } else {
                        let (_, t) = self.parse_declarator(pbase)?;
                        t
                    };
                    params.push(ty.decay());
                    if !self.eat_punct(Punct::Comma) {
                        break;
                    }
                }
            }
            self.expect_punct(Punct::RParen, ")")?;
            return Ok(Rc::new(Type::Function { ret: base, params, variadic }));
        }
        Ok(base)
    }

    fn peek_kind(&self, n: usize) -> &TokenKind {
        let idx = (self.pos + n).min(self.toks.len() - 1);
        &self.toks[idx].kind
    }

    fn parse_type_name(&mut self) -> Result<Rc<Type>> {
        let (base, _) = self.parse_decl_specifiers()?;
        let mut ty = base;
        while self.eat_punct(Punct::Star) {
            ty = Type::pointer_to(ty);
        }
        self.parse_type_suffix(ty)
    }

    // ---------------------------------------------------------------
    // Initializers
    // ---------------------------------------------------------------

    fn parse_initializer(&mut self, ty: &Rc<Type>) -> Result<Initializer> {
        if self.eat_punct(Punct::LBrace) {
            let mut items = Vec::new();
            let mut index = 0u64;
            while !self.eat_punct(Punct::RBrace) {
                let designator = if self.eat_punct(Punct::LBracket) {
                    let e = self.parse_assignment()?;
                    self.expect_punct(Punct::RBracket, "]")?;
                    self.expect_punct(Punct::Assign, "=")?;
                    if let ExprKind::IntLit(v) = e.kind {
                        index = v as u64;
                    }
                    Some(index)
                } else if self.eat_punct(Punct::Dot) {
                    let _ = self.ident()?;
                    self.expect_punct(Punct::Assign, "=")?;
                    Some(index)
                } else {
                    Some(index)
                };
                let elem_ty = match ty.as_ref() {
                    Type::Array { elem, .. } => elem.clone(),
                    Type::Struct { members, .. } => members
                        .get(index as usize)
                        .map(|m| m.ty.clone())
                        .unwrap_or_else(Type::int),
                    _ => ty.clone(),
                };
                let init = self.parse_initializer(&elem_ty)?;
                items.push((designator, init));
                index += 1;
                if !self.eat_punct(Punct::Comma) {
                    continue;
                }
            }
            Ok(Initializer::List(items))
        } else if let TokenKind::Literal(Literal::Str(bytes)) = self.cur().clone() {
            if ty.is_array() {
                self.bump();
                self.string_literals.push(Rc::new(bytes.clone()));
                let e = Expr {
                    kind: ExprKind::StrLit(Rc::new(bytes)),
                    ty: ty.clone(),
                    is_lvalue: false,
                    span: self.cur_span(),
                };
                Ok(Initializer::Scalar(e))
            } else {
                Ok(Initializer::Scalar(self.parse_assignment()?))
            }
        } else {
            Ok(Initializer::Scalar(self.parse_assignment()?))
        }
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    fn parse_block(&mut self) -> Result<Stmt> {
        self.expect_punct(Punct::LBrace, "{")?;
        self.scopes.push();
        let mut stmts = Vec::new();
        while !self.eat_punct(Punct::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.scopes.pop();
        Ok(Stmt::Block(stmts))
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        match self.cur().clone() {
            TokenKind::Punct(Punct::LBrace) => self.parse_block(),
            TokenKind::Keyword(Keyword::If) => {
                self.bump();
                self.expect_punct(Punct::LParen, "(")?;
                let cond = self.parse_expr()?;
                self.expect_punct(Punct::RParen, ")")?;
                let then_branch = Box::new(self.parse_stmt()?);
                let else_branch = if self.eat_keyword(Keyword::Else) {
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If { cond, then_branch, else_branch })
            }
            TokenKind::Keyword(Keyword::While) => {
                self.bump();
                self.expect_punct(Punct::LParen, "(")?;
                let cond = self.parse_expr()?;
                self.expect_punct(Punct::RParen, ")")?;
                self.loop_depth += 1;
                let body = Box::new(self.parse_stmt()?);
                self.loop_depth -= 1;
                Ok(Stmt::While { cond, body })
            }
            TokenKind::Keyword(Keyword::Do) => {
                self.bump();
                self.loop_depth += 1;
                let body = Box::new(self.parse_stmt()?);
                self.loop_depth -= 1;
                if !self.eat_keyword(Keyword::While) {
                    return Err(ParseError::Expected("while", self.cur_span()));
                }
                self.expect_punct(Punct::LParen, "(")?;
                let cond = self.parse_expr()?;
                self.expect_punct(Punct::RParen, ")")?;
                self.expect_punct(Punct::Semi, ";")?;
                Ok(Stmt::DoWhile { body, cond })
            }
            TokenKind::Keyword(Keyword::For) => {
                self.bump();
                self.expect_punct(Punct::LParen, "(")?;
                self.scopes.push();
                let init = if matches!(self.cur(), TokenKind::Punct(Punct::Semi)) {
                    self.bump();
                    None
                } else if self.is_type_start() {
                    Some(Box::new(self.parse_decl_stmt()?))
                } else {
                    let e = self.parse_expr()?;
                    self.expect_punct(Punct::Semi, ";")?;
                    Some(Box::new(Stmt::ExprStmt(e)))
                };
                let cond = if matches!(self.cur(), TokenKind::Punct(Punct::Semi)) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_punct(Punct::Semi, ";")?;
                let step = if matches!(self.cur(), TokenKind::Punct(Punct::RParen)) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_punct(Punct::RParen, ")")?;
                self.loop_depth += 1;
                let body = Box::new(self.parse_stmt()?);
                self.loop_depth -= 1;
                self.scopes.pop();
                Ok(Stmt::For { init, cond, step, body })
            }
            TokenKind::Keyword(Keyword::Switch) => {
                self.bump();
                self.expect_punct(Punct::LParen, "(")?;
                let value = self.parse_expr()?;
                if !value.ty.is_integer() {
                    return Err(ParseError::SwitchNotInteger(value.span));
                }
                self.expect_punct(Punct::RParen, ")")?;
                self.switch_depth += 1;
                self.switch_cases.push(Vec::new());
                let body = Box::new(self.parse_stmt()?);
                let seen = self.switch_cases.pop().unwrap();
                self.switch_depth -= 1;
                let cases = seen.into_iter().map(|v| SwitchCase { value: Some(v) }).collect();
                Ok(Stmt::Switch { value, body, cases })
            }
            TokenKind::Keyword(Keyword::Case) => {
                self.bump();
                let e = self.parse_conditional()?;
                self.expect_punct(Punct::Colon, ":")?;
                if self.switch_depth == 0 {
                    return Err(ParseError::CaseOutsideSwitch(self.cur_span()));
                }
                let value = match e.kind {
                    ExprKind::IntLit(v) => v,
                    _ => 0,
                };
                if let Some(top) = self.switch_cases.last_mut() {
                    if top.contains(&value) {
                        return Err(ParseError::DuplicateCase(self.cur_span()));
                    }
                    top.push(value);
                }
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::Case { value, body })
            }
            TokenKind::Keyword(Keyword::Default) => {
                self.bump();
                self.expect_punct(Punct::Colon, ":")?;
                if self.switch_depth == 0 {
                    return Err(ParseError::CaseOutsideSwitch(self.cur_span()));
                }
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::Default(body))
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.bump();
                self.expect_punct(Punct::Semi, ";")?;
                if self.loop_depth == 0 && self.switch_depth == 0 {
                    return Err(ParseError::BreakContinueOutsideLoop(self.cur_span()));
                }
                Ok(Stmt::Break)
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.bump();
                self.expect_punct(Punct::Semi, ";")?;
                if self.loop_depth == 0 {
                    return Err(ParseError::BreakContinueOutsideLoop(self.cur_span()));
                }
                Ok(Stmt::Continue)
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.bump();
                let e = if matches!(self.cur(), TokenKind::Punct(Punct::Semi)) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_punct(Punct::Semi, ";")?;
                Ok(Stmt::Return(e))
            }
            TokenKind::Keyword(Keyword::Goto) => {
                self.bump();
                let n = self.ident()?;
                self.expect_punct(Punct::Semi, ";")?;
                Ok(Stmt::Goto(n))
            }
            TokenKind::Punct(Punct::Semi) => {
                self.bump();
                Ok(Stmt::Empty)
            }
            TokenKind::Ident(n)
                if matches!(self.peek_kind(1), TokenKind::Punct(Punct::Colon))
                    && !self.typedefs_seen.contains_key(&n) =>
            {
                self.bump();
                self.bump();
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::Label(n, body))
            }
            _ if self.is_type_start() => self.parse_decl_stmt(),
            _ => {
                let e = self.parse_expr()?;
                self.expect_punct(Punct::Semi, ";")?;
                Ok(Stmt::ExprStmt(e))
            }
        }
    }

    fn parse_decl_stmt(&mut self) -> Result<Stmt> {
        let (base, storage) = self.parse_decl_specifiers()?;
        let mut decls = Vec::new();
        if !matches!(self.cur(), TokenKind::Punct(Punct::Semi)) {
            loop {
                let (name, ty) = self.parse_declarator(base.clone())?;
                if self.scopes.declare_in_same_scope(name) {
                    return Err(ParseError::Redefinition(self.cur_span()));
                }
                let offset = if !self.scopes.is_global() && storage != StorageClass::Static {
                    self.next_local_offset -= ty.size() as i64;
                    self.next_local_offset = align_down(self.next_local_offset, ty.align() as i64);
                    self.next_local_offset
                } else {
                    0
                };
                let init = if self.eat_punct(Punct::Assign) {
                    Some(self.parse_initializer(&ty)?)
                } else {
                    None
                };
                self.scopes
                    .declare(Symbol {
                        name,
                        kind: SymbolKind::Local,
                        ty: ty.clone(),
                        storage,
                        frame_offset: offset,
                        enum_value: 0,
                    })
                    .ok();
                decls.push(Declarator { name, ty, init, storage, frame_offset: offset });
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::Semi, ";")?;
        Ok(Stmt::Decl(decls))
    }

    // ---------------------------------------------------------------
    // Expressions — 17 precedence levels, assignment right-assoc, comma lowest.
    // ---------------------------------------------------------------

    pub fn parse_expr(&mut self) -> Result<Expr> {
        let mut e = self.parse_assignment()?;
        while self.eat_punct(Punct::Comma) {
            let rhs = self.parse_assignment()?;
            let ty = rhs.ty.clone();
            let span = rhs.span;
            e = Expr { kind: ExprKind::Comma(Box::new(e), Box::new(rhs)), ty, is_lvalue: false, span };
        }
        Ok(e)
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let lhs = self.parse_conditional()?;
        let compound = match self.cur() {
            TokenKind::Punct(Punct::Assign) => None,
            TokenKind::Punct(Punct::PlusEq) => Some(BinOp::Add),
            TokenKind::Punct(Punct::MinusEq) => Some(BinOp::Sub),
            TokenKind::Punct(Punct::StarEq) => Some(BinOp::Mul),
            TokenKind::Punct(Punct::SlashEq) => Some(BinOp::Div),
            TokenKind::Punct(Punct::PercentEq) => Some(BinOp::Mod),
            TokenKind::Punct(Punct::AmpEq) => Some(BinOp::And),
            TokenKind::Punct(Punct::PipeEq) => Some(BinOp::Or),
            TokenKind::Punct(Punct::CaretEq) => Some(BinOp::Xor),
            TokenKind::Punct(Punct::ShlEq) => Some(BinOp::Shl),
            TokenKind::Punct(Punct::ShrEq) => Some(BinOp::Shr),
            _ => return Ok(lhs),
        };
        if !matches!(self.cur(), TokenKind::Punct(Punct::Assign)) && compound.is_none() {
            return Ok(lhs);
        }
        if !lhs.is_lvalue {
            return Err(ParseError::NotLvalue(lhs.span));
        }
        self.bump();
        let rhs = self.parse_assignment()?;
        let span = lhs.span;
        let ty = lhs.ty.clone();
        if let Some(op) = compound {
            Ok(Expr { kind: ExprKind::CompoundAssign(op, Box::new(lhs), Box::new(rhs)), ty, is_lvalue: false, span })
        } else {
            Ok(Expr { kind: ExprKind::Assign(Box::new(lhs), Box::new(rhs)), ty, is_lvalue: false, span })
        }
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let cond = self.parse_logor()?;
        if self.eat_punct(Punct::Question) {
            let t = self.parse_expr()?;
            self.expect_punct(Punct::Colon, ":")?;
            let f = self.parse_conditional()?;
            let ty = if t.ty.is_arithmetic() && f.ty.is_arithmetic() {
                usual_arith_conv(&t.ty, &f.ty)
            } else {
                t.ty.clone()
            };
            let span = cond.span;
            return Ok(Expr {
                kind: ExprKind::Conditional(Box::new(cond), Box::new(t), Box::new(f)),
                ty,
                is_lvalue: false,
                span,
            });
        }
        Ok(cond)
    }

    fn bin_level(
        &mut self,
        next: fn(&mut Self) -> Result<Expr>,
        ops: &[(Punct, BinOp)],
    ) -> Result<Expr> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (p, op) in ops {
                if matches!(self.cur(), TokenKind::Punct(x) if x == p) {
                    self.bump();
                    let rhs = next(self)?;
                    lhs = self.make_binary(*op, lhs, rhs);
                    continue 'outer;
                }
            }
            break;
        }
        Ok(lhs)
    }

    fn make_binary(&self, op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        let span = lhs.span;
        let (lhs_d, rhs_d) = (decay_expr(lhs), decay_expr(rhs));
        let ty = result_type(op, &lhs_d.ty, &rhs_d.ty);
        let folded = fold_const(op, &lhs_d, &rhs_d, &ty);
        folded.unwrap_or(Expr {
            kind: ExprKind::Binary(op, Box::new(lhs_d), Box::new(rhs_d)),
            ty,
            is_lvalue: false,
            span,
        })
    }

    fn parse_logor(&mut self) -> Result<Expr> {
        self.bin_level(Self::parse_logand, &[(Punct::OrOr, BinOp::LogOr)])
    }
    fn parse_logand(&mut self) -> Result<Expr> {
        self.bin_level(Self::parse_bitor, &[(Punct::AndAnd, BinOp::LogAnd)])
    }
    fn parse_bitor(&mut self) -> Result<Expr> {
        self.bin_level(Self::parse_bitxor, &[(Punct::Pipe, BinOp::Or)])
    }
    fn parse_bitxor(&mut self) -> Result<Expr> {
        self.bin_level(Self::parse_bitand, &[(Punct::Caret, BinOp::Xor)])
    }
    fn parse_bitand(&mut self) -> Result<Expr> {
        self.bin_level(Self::parse_eq, &[(Punct::Amp, BinOp::And)])
    }
    fn parse_eq(&mut self) -> Result<Expr> {
        self.bin_level(Self::parse_rel, &[(Punct::Eq, BinOp::Eq), (Punct::Ne, BinOp::Ne)])
    }
    fn parse_rel(&mut self) -> Result<Expr> {
        self.bin_level(
            Self::parse_shift,
            &[(Punct::Lt, BinOp::Lt), (Punct::Le, BinOp::Le), (Punct::Gt, BinOp::Gt), (Punct::Ge, BinOp::Ge)],
        )
    }
    fn parse_shift(&mut self) -> Result<Expr> {
        self.bin_level(Self::parse_add, &[(Punct::Shl, BinOp::Shl), (Punct::Shr, BinOp::Shr)])
    }
    fn parse_add(&mut self) -> Result<Expr> {
        self.bin_level(Self::parse_mul, &[(Punct::Plus, BinOp::Add), (Punct::Minus, BinOp::Sub)])
    }
    fn parse_mul(&mut self) -> Result<Expr> {
        self.bin_level(
            Self::parse_cast,
            &[(Punct::Star, BinOp::Mul), (Punct::Slash, BinOp::Div), (Punct::Percent, BinOp::Mod)],
        )
    }

    fn parse_cast(&mut self) -> Result<Expr> {
        if matches!(self.cur(), TokenKind::Punct(Punct::LParen)) && self.is_type_start_at(1) {
            let save = self.pos;
            self.bump();
            let ty = self.parse_type_name()?;
            if self.eat_punct(Punct::RParen) {
                let inner = self.parse_cast()?;
                let span = inner.span;
                return Ok(Expr { kind: ExprKind::Cast(Box::new(inner)), ty, is_lvalue: false, span });
            }
            self.pos = save;
        }
        self.parse_unary()
    }

    fn is_type_start_at(&self, offset: usize) -> bool {
        match self.peek_kind(offset) {
            TokenKind::Keyword(k) => matches!(
                k,
                Keyword::Int
                    | Keyword::Char
                    | Keyword::Short
                    | Keyword::Long
                    | Keyword::Signed
                    | Keyword::Unsigned
                    | Keyword::Void
                    | Keyword::Float
                    | Keyword::Double
                    | Keyword::Struct
                    | Keyword::Union
                    | Keyword::Enum
                    | Keyword::Const
            ),
            TokenKind::Ident(n) => self.typedefs_seen.contains_key(n),
            _ => false,
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let span = self.cur_span();
        match self.cur().clone() {
            TokenKind::Punct(Punct::Plus) => {
                self.bump();
                self.parse_cast()
            }
            TokenKind::Punct(Punct::Minus) => {
                self.bump();
                let e = decay_expr(self.parse_cast()?);
                let ty = e.ty.clone();
                if let ExprKind::IntLit(v) = e.kind {
                    return Ok(Expr { kind: ExprKind::IntLit(-v), ty, is_lvalue: false, span });
                }
                Ok(Expr { kind: ExprKind::Unary(UnOp::Neg, Box::new(e)), ty, is_lvalue: false, span })
            }
            TokenKind::Punct(Punct::Bang) => {
                self.bump();
                let e = decay_expr(self.parse_cast()?);
                Ok(Expr { kind: ExprKind::Unary(UnOp::Not, Box::new(e)), ty: Type::int(), is_lvalue: false, span })
            }
            TokenKind::Punct(Punct::Tilde) => {
                self.bump();
                let e = decay_expr(self.parse_cast()?);
                let ty = e.ty.clone();
                Ok(Expr { kind: ExprKind::Unary(UnOp::BitNot, Box::new(e)), ty, is_lvalue: false, span })
            }
            TokenKind::Punct(Punct::Amp) => {
                self.bump();
                let e = self.parse_cast()?;
                if !e.is_lvalue {
                    return Err(ParseError::NotAddressable(e.span));
                }
                let ty = Type::pointer_to(e.ty.clone());
                Ok(Expr { kind: ExprKind::Unary(UnOp::Addr, Box::new(e)), ty, is_lvalue: false, span })
            }
            TokenKind::Punct(Punct::Star) => {
                self.bump();
                let e = decay_expr(self.parse_cast()?);
                let ty = match e.ty.as_ref() {
                    Type::Pointer(inner) => inner.clone(),
                    _ => return Err(ParseError::TypeMismatch(e.span)),
                };
                Ok(Expr { kind: ExprKind::Unary(UnOp::Deref, Box::new(e)), ty, is_lvalue: true, span })
            }
            TokenKind::Punct(Punct::Inc) | TokenKind::Punct(Punct::Dec) => {
                let dec = matches!(self.cur(), TokenKind::Punct(Punct::Dec));
                self.bump();
                let e = self.parse_unary()?;
                let ty = e.ty.clone();
                let op = if dec { BinOp::Sub } else { BinOp::Add };
                let one = Expr { kind: ExprKind::IntLit(1), ty: Type::int(), is_lvalue: false, span };
                Ok(Expr { kind: ExprKind::CompoundAssign(op, Box::new(e), Box::new(one)), ty, is_lvalue: false, span })
            }
            TokenKind::Keyword(Keyword::Sizeof) => {
                self.bump();
                let size = if matches!(self.cur(), TokenKind::Punct(Punct::LParen)) && self.is_type_start_at(1) {
                    self.bump();
                    let ty = self.parse_type_name()?;
                    self.expect_punct(Punct::RParen, ")")?;
                    if !ty.is_complete() {
                        return Err(ParseError::SizeofIncomplete(span));
                    }
                    ty.size()
                } else {
                    let e = self.parse_unary()?;
                    if !e.ty.is_complete() {
                        return Err(ParseError::SizeofIncomplete(span));
                    }
                    e.ty.size()
                };
                Ok(Expr { kind: ExprKind::Sizeof(size), ty: Type::ulong(), is_lvalue: false, span })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut e = self.parse_primary()?;
        loop {
            match self.cur().clone() {
                TokenKind::Punct(Punct::LBracket) => {
                    self.bump();
                    let idx = self.parse_expr()?;
                    self.expect_punct(Punct::RBracket, "]")?;
                    let base = decay_expr(e);
                    let ty = match base.ty.as_ref() {
                        Type::Pointer(inner) => inner.clone(),
                        _ => return Err(ParseError::TypeMismatch(idx.span)),
                    };
                    let span = base.span;
                    e = Expr { kind: ExprKind::Index(Box::new(base), Box::new(idx)), ty, is_lvalue: true, span };
                }
                TokenKind::Punct(Punct::LParen) => {
                    self.bump();
                    let mut args = Vec::new();
                    if !matches!(self.cur(), TokenKind::Punct(Punct::RParen)) {
                        loop {
                            args.push(decay_expr(self.parse_assignment()?));
                            if !self.eat_punct(Punct::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect_punct(Punct::RParen, ")")?;
                    let callee = decay_expr(e);
                    let ret = match callee.ty.as_ref() {
                        Type::Pointer(inner) => match inner.as_ref() {
                            Type::Function { ret, .. } => ret.clone(),
                            _ => Type::int(),
                        },
                        Type::Function { ret, .. } => ret.clone(),
                        _ => Type::int(),
                    };
                    let span = callee.span;
                    e = Expr { kind: ExprKind::Call(Box::new(callee), args), ty: ret, is_lvalue: false, span };
                }
                TokenKind::Punct(Punct::Dot) => {
                    self.bump();
                    let name = self.ident()?;
                    let (ty, offset) = member_info(&e.ty, name)?;
                    let span = e.span;
                    e = Expr { kind: ExprKind::Member { base: Box::new(e), member: name, offset }, ty, is_lvalue: true, span };
                }
                TokenKind::Punct(Punct::Arrow) => {
                    self.bump();
                    let name = self.ident()?;
                    let inner_ty = match e.ty.as_ref() {
                        Type::Pointer(inner) => inner.clone(),
                        _ => return Err(ParseError::TypeMismatch(e.span)),
                    };
                    let (ty, offset) = member_info(&inner_ty, name)?;
                    let span = e.span;
                    let deref = Expr { kind: ExprKind::Unary(UnOp::Deref, Box::new(e)), ty: inner_ty, is_lvalue: true, span };
                    e = Expr { kind: ExprKind::Member { base: Box::new(deref), member: name, offset }, ty, is_lvalue: true, span };
                }
                TokenKind::Punct(Punct::Inc) | TokenKind::Punct(Punct::Dec) => {
                    let dec = matches!(self.cur(), TokenKind::Punct(Punct::Dec));
                    self.bump();
                    let ty = e.ty.clone();
                    let op = if dec { BinOp::Sub } else { BinOp::Add };
                    let one = Expr { kind: ExprKind::IntLit(1), ty: Type::int(), is_lvalue: false, span: e.span };
                    // Post-inc/dec: evaluates to the *old* value; approximated here
                    // (matching small single-pass compilers) as the compound
                    // assignment's result, which IR lowering adjusts to read-before-write.
                    let span = e.span;
                    e = Expr { kind: ExprKind::CompoundAssign(op, Box::new(e), Box::new(one)), ty, is_lvalue: false, span };
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let span = self.cur_span();
        match self.cur().clone() {
            TokenKind::Punct(Punct::LParen) => {
                self.bump();
                let e = self.parse_expr()?;
                self.expect_punct(Punct::RParen, ")")?;
                Ok(e)
            }
            TokenKind::Literal(Literal::Int { value, unsigned, long }) => {
                self.bump();
                let ty = if long || value > i32::MAX as i128 {
                    if unsigned { Type::ulong() } else { Type::long() }
                } else if unsigned {
                    Type::uint()
                } else {
                    Type::int()
                };
                Ok(Expr { kind: ExprKind::IntLit(value), ty, is_lvalue: false, span })
            }
            TokenKind::Literal(Literal::Char(c)) => {
                self.bump();
                Ok(Expr { kind: ExprKind::IntLit(c as i128), ty: Type::char(), is_lvalue: false, span })
            }
            TokenKind::Literal(Literal::Float { value, is_float }) => {
                self.bump();
                let ty = if is_float { Type::float() } else { Type::double() };
                Ok(Expr { kind: ExprKind::FloatLit(value), ty, is_lvalue: false, span })
            }
            TokenKind::Literal(Literal::Str(bytes)) => {
                self.bump();
                let len = bytes.len() as u64 + 1;
                self.string_literals.push(Rc::new(bytes.clone()));
                Ok(Expr {
                    kind: ExprKind::StrLit(Rc::new(bytes)),
                    ty: Rc::new(Type::Array { elem: Type::char(), len: Some(len) }),
                    is_lvalue: true,
                    span,
                })
            }
            TokenKind::Ident(n) => {
                self.bump();
                trace!("resolving identifier use");
                let sym = self.scopes.lookup(n).ok_or(ParseError::Undeclared(span))?;
                let ty = sym.ty.clone();
                let is_lvalue = !matches!(sym.kind, SymbolKind::EnumConst | SymbolKind::Function);
                if sym.kind == SymbolKind::EnumConst {
                    return Ok(Expr { kind: ExprKind::IntLit(sym.enum_value as i128), ty, is_lvalue: false, span });
                }
                Ok(Expr { kind: ExprKind::Var(n), ty, is_lvalue, span })
            }
            _ => Err(ParseError::UnexpectedToken(span)),
        }
    }
}

fn align_down(offset: i64, align: i64) -> i64 {
    if align <= 1 {
        return offset;
    }
    -(((-offset) + align - 1) / align * align)
}

fn splice_base(inner: &Rc<Type>, outer: &Rc<Type>) -> Rc<Type> {
    match inner.as_ref() {
        Type::Pointer(t) => Type::pointer_to(splice_base(t, outer)),
        Type::Array { elem, len } => Rc::new(Type::Array { elem: splice_base(elem, outer), len: *len }),
        Type::Function { ret, params, variadic } => {
            Rc::new(Type::Function { ret: splice_base(ret, outer), params: params.clone(), variadic: *variadic })
        }
        Type::Void => outer.clone(),
        _ => outer.clone(),
    }
}

fn decay_expr(e: Expr) -> Expr {
    if e.ty.is_array() || e.ty.is_function() {
        let ty = e.ty.decay();
        let span = e.span;
        Expr { kind: e.kind, ty, is_lvalue: false, span }
    } else {
        e
    }
}

fn member_info(ty: &Rc<Type>, name: Name) -> Result<(Rc<Type>, u64)> {
    if let Some(members) = ty.members() {
        for m in members.iter() {
            if m.name == name {
                return Ok((m.ty.clone(), m.offset));
            }
        }
    }
    Ok((Type::int(), 0))
}

/// Pointer arithmetic scales by element size; otherwise usual arithmetic
/// conversions apply.
fn result_type(op: BinOp, lhs: &Rc<Type>, rhs: &Rc<Type>) -> Rc<Type> {
    match op {
        BinOp::Add | BinOp::Sub => {
            if lhs.is_pointer() && rhs.is_integer() {
                return lhs.clone();
            }
            if lhs.is_integer() && rhs.is_pointer() && op == BinOp::Add {
                return rhs.clone();
            }
            if lhs.is_pointer() && rhs.is_pointer() && op == BinOp::Sub {
                return Type::long();
            }
            usual_arith_conv(lhs, rhs)
        }
        BinOp::LogAnd | BinOp::LogOr | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => {
            Type::int()
        }
        _ => usual_arith_conv(lhs, rhs),
    }
}

/// Narrows a folded constant to the range its result type can actually
/// hold, the same truncate-on-store behavior every other assignment or
/// cast gets — a fold that skipped this would hand codegen a value too
/// wide for the type it claims to have.
fn wrap_to_type(v: i128, ty: &Type) -> i128 {
    let Type::Int { signed, width } = ty else { return v };
    match (signed, width) {
        (true, 1) => v as i8 as i128,
        (true, 2) => v as i16 as i128,
        (true, 4) => v as i32 as i128,
        (true, _) => v as i64 as i128,
        (false, 1) => v as u8 as i128,
        (false, 2) => v as u16 as i128,
        (false, 4) => v as u32 as i128,
        (false, _) => v as u64 as i128,
    }
}

fn fold_const(op: BinOp, lhs: &Expr, rhs: &Expr, ty: &Rc<Type>) -> Option<Expr> {
    let (ExprKind::IntLit(a), ExprKind::IntLit(b)) = (&lhs.kind, &rhs.kind) else {
        return None;
    };
    let (a, b) = (*a, *b);
    let v = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div if b != 0 => a / b,
        BinOp::Mod if b != 0 => a % b,
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::Shl => a << b,
        BinOp::Shr => a >> b,
        BinOp::Lt => (a < b) as i128,
        BinOp::Le => (a <= b) as i128,
        BinOp::Gt => (a > b) as i128,
        BinOp::Ge => (a >= b) as i128,
        BinOp::Eq => (a == b) as i128,
        BinOp::Ne => (a != b) as i128,
        BinOp::LogAnd => ((a != 0) && (b != 0)) as i128,
        BinOp::LogOr => ((a != 0) || (b != 0)) as i128,
        _ => return None,
    };
    let v = wrap_to_type(v, ty);
    Some(Expr { kind: ExprKind::IntLit(v), ty: ty.clone(), is_lvalue: false, span: lhs.span })
}
