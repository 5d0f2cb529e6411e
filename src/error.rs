//! Error taxonomy for spell execution.
//!
//! Every failure during tokenization, dispatch, or evaluation is one of six
//! kinds. There is no in-language recovery: the first error propagates to
//! the driver, which reports the backfire and aborts the program.

use thiserror::Error;

/// An error raised while casting a spell.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpellError {
    /// Malformed statement, missing grimoire brackets, unknown keyword,
    /// or an empty block body.
    #[error("{0}")]
    Syntax(String),

    /// Read, rebind, or banish of an unbound variable; invocation of an
    /// undefined ritual.
    #[error("{0}")]
    Name(String),

    /// Operand of the wrong kind: non-numeric arithmetic, indexing a
    /// non-collection, a non-integer position.
    #[error("{0}")]
    Type(String),

    /// Collection position outside `[0, length)`.
    #[error("{0}")]
    Index(String),

    /// Failed transmutation, malformed number literal, or ritual arity
    /// mismatch.
    #[error("{0}")]
    Value(String),

    /// `divided by` with a zero divisor.
    #[error("division by zero")]
    ZeroDivision,
}
