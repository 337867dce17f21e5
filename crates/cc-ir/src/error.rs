//! `cc-ir` has almost no error taxonomy of its own: once semantic analysis
//! has passed, lowering cannot fail on a well-typed program and an
//! inconsistency found here is an internal invariant break that should
//! abort, not a user-facing diagnostic.
//!
//! The one real exception is target capability: a variadic definition or
//! call is a well-typed program that this target's ABI cannot lower.

use cc_interner::Span;

#[derive(thiserror::Error, Debug)]
pub enum IrError {
    #[error("variadic functions are not supported on this target")]
    UnsupportedOnTarget(Span),
}

pub type Result<T> = std::result::Result<T, IrError>;
