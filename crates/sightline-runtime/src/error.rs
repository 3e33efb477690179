//! Display engine errors.

#![allow(missing_docs)]

use sightline_calc::CalcError;
use smol_str::SmolStr;
use thiserror::Error;

/// Errors raised by registration, template loading, expressions and writes.
///
/// Every variant is scoped to one element, one channel or one subtree; none
/// of them aborts composition of the enclosing display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisplayError {
    /// Channel name is empty or whitespace.
    #[error("empty channel name")]
    EmptyName,

    /// Channel, window or element does not exist.
    #[error("'{0}' not found")]
    NotFound(SmolStr),

    /// Expression text could not be compiled.
    #[error("expression syntax error: {0}")]
    Syntax(SmolStr),

    /// Expression evaluation failed.
    #[error("expression evaluation failed: {0}")]
    Eval(SmolStr),

    /// Outbound value rejected before it reached the value source.
    #[error("invalid value '{0}'")]
    InvalidValue(SmolStr),

    /// Template document could not be loaded.
    #[error("could not load display '{0}'")]
    LoadFailure(SmolStr),

    /// Slot table is full; the channel will never connect.
    #[error("slot table exhausted while registering '{0}'")]
    SlotExhausted(SmolStr),

    /// Configuration error.
    #[error("invalid config '{0}'")]
    InvalidConfig(SmolStr),

    /// Value source reported a failure.
    #[error("value source error: {0}")]
    Source(SmolStr),
}

impl From<CalcError> for DisplayError {
    fn from(err: CalcError) -> Self {
        match err {
            CalcError::Syntax { message, range } => Self::Syntax(
                format!("{message} at {}..{}", u32::from(range.start()), u32::from(range.end()))
                    .into(),
            ),
            CalcError::Eval(message) => Self::Eval(message),
        }
    }
}
