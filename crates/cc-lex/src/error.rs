use cc_interner::Span;

/// Lex/preprocess error taxonomy.
#[derive(thiserror::Error, Debug)]
pub enum LexError {
    #[error("stray character {0:?}")]
    BadChar(char, Span),
    #[error("unterminated string literal")]
    UnterminatedString(Span),
    #[error("unterminated block comment")]
    UnterminatedComment(Span),
    #[error("bad escape sequence")]
    BadEscape(Span),
    #[error("unknown preprocessor directive {0:?}")]
    UnknownDirective(String, Span),
    #[error("mismatched #if/#endif")]
    MismatchedConditional(Span),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("#error: {0}")]
    UserError(String, Span),
    #[error("malformed #if/#elif expression")]
    MalformedIfExpr,
}

impl LexError {
    pub fn span(&self) -> Option<Span> {
        match self {
            LexError::BadChar(_, s)
            | LexError::UnterminatedString(s)
            | LexError::UnterminatedComment(s)
            | LexError::BadEscape(s)
            | LexError::UnknownDirective(_, s)
            | LexError::MismatchedConditional(s)
            | LexError::UserError(_, s) => Some(*s),
            LexError::FileNotFound(_) | LexError::MalformedIfExpr => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LexError>;
