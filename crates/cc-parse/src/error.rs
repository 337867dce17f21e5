use cc_interner::Span;

/// Parse, type, and semantic error taxonomy.
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("unexpected token")]
    UnexpectedToken(Span),
    #[error("expected {0}")]
    Expected(&'static str, Span),
    #[error("redefinition of identifier")]
    Redefinition(Span),
    #[error("use of undeclared identifier")]
    Undeclared(Span),
    #[error("incompatible types")]
    TypeMismatch(Span),
    #[error("expression is not an lvalue")]
    NotLvalue(Span),
    #[error("cannot take address of bitfield/register value")]
    NotAddressable(Span),
    #[error("switch statement requires an integer controlling expression")]
    SwitchNotInteger(Span),
    #[error("case label outside switch")]
    CaseOutsideSwitch(Span),
    #[error("break/continue outside loop or switch")]
    BreakContinueOutsideLoop(Span),
    #[error("duplicate case value in switch")]
    DuplicateCase(Span),
    #[error("sizeof of incomplete type")]
    SizeofIncomplete(Span),
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken(s)
            | ParseError::Expected(_, s)
            | ParseError::Redefinition(s)
            | ParseError::Undeclared(s)
            | ParseError::TypeMismatch(s)
            | ParseError::NotLvalue(s)
            | ParseError::NotAddressable(s)
            | ParseError::SwitchNotInteger(s)
            | ParseError::CaseOutsideSwitch(s)
            | ParseError::BreakContinueOutsideLoop(s)
            | ParseError::DuplicateCase(s)
            | ParseError::SizeofIncomplete(s) => *s,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
