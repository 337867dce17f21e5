//! Typed AST nodes.

use std::rc::Rc;

use cc_interner::{Name, Span};

use crate::ty::Type;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    LogAnd,
    LogOr,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
    Addr,
    Deref,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    IntLit(i128),
    FloatLit(f64),
    StrLit(Rc<Vec<u8>>),
    /// A resolved use of a local/param/global/enum-const.
    Var(Name),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Assign(Box<Expr>, Box<Expr>),
    /// Compound assignment already desugared to `lhs = lhs OP rhs` at parse
    /// time, except the lhs sub-expression is evaluated once (held here) to
    /// avoid double side effects; emitted as `CompoundAssign` so IR lowering
    /// can choose to address-compute once.
    CompoundAssign(BinOp, Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Member { base: Box<Expr>, member: Name, offset: u64 },
    Index(Box<Expr>, Box<Expr>),
    Cast(Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Comma(Box<Expr>, Box<Expr>),
    Sizeof(u64),
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Rc<Type>,
    pub is_lvalue: bool,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum Initializer {
    Scalar(Expr),
    List(Vec<(Option<u64>, Initializer)>),
}

#[derive(Clone, Debug)]
pub struct Declarator {
    pub name: Name,
    pub ty: Rc<Type>,
    pub init: Option<Initializer>,
    pub storage: crate::scope::StorageClass,
    pub frame_offset: i64,
}

#[derive(Clone, Debug)]
pub enum Stmt {
    Block(Vec<Stmt>),
    ExprStmt(Expr),
    Decl(Vec<Declarator>),
    If { cond: Expr, then_branch: Box<Stmt>, else_branch: Option<Box<Stmt>> },
    While { cond: Expr, body: Box<Stmt> },
    DoWhile { body: Box<Stmt>, cond: Expr },
    For { init: Option<Box<Stmt>>, cond: Option<Expr>, step: Option<Expr>, body: Box<Stmt> },
    Switch { value: Expr, body: Box<Stmt>, cases: Vec<SwitchCase> },
    Case { value: i128, body: Box<Stmt> },
    Default(Box<Stmt>),
    Break,
    Continue,
    Return(Option<Expr>),
    Goto(Name),
    Label(Name, Box<Stmt>),
    Empty,
}

#[derive(Clone, Debug)]
pub struct SwitchCase {
    pub value: Option<i128>, // None = default
}

#[derive(Clone, Debug)]
pub struct Function {
    pub name: Name,
    pub ty: Rc<Type>,
    pub params: Vec<Declarator>,
    pub body: Option<Stmt>,
    pub is_static: bool,
    pub is_variadic: bool,
}

#[derive(Clone, Debug)]
pub struct Global {
    pub name: Name,
    pub ty: Rc<Type>,
    pub init: Option<Initializer>,
    pub is_static: bool,
    pub is_extern: bool,
}

pub struct TranslationUnit {
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
}
