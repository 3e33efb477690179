//! Calc expression compiler and evaluator.
//!
//! Display elements carry small infix formulas over up to sixteen inputs
//! `A`..`P`. This crate compiles such text into a postfix [`Program`] once,
//! and evaluates it as often as the inputs change.
//!
//! ```
//! let program = sightline_calc::compile("A+B>3").unwrap();
//! assert_eq!(program.evaluate(&[1.0, 4.0]).unwrap(), 1.0);
//! ```

mod compile;
pub mod lexer;
mod program;

use smol_str::SmolStr;
use text_size::TextRange;
use thiserror::Error;

pub use compile::compile;
pub use program::{BinaryOp, Op, Program, UnaryOp, MAX_INPUTS};

/// Number of inputs a caller is expected to supply at minimum.
///
/// The display engine fills `A`..`L` from the first channel and its
/// metadata; programs touching only those never fail on a missing input.
pub const MIN_INPUTS: usize = 12;

/// Errors produced while compiling or evaluating a calc expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    /// Expression text could not be parsed.
    #[error("syntax error at {range:?}: {message}")]
    Syntax { message: SmolStr, range: TextRange },
    /// Evaluation failed.
    #[error("evaluation failed: {0}")]
    Eval(SmolStr),
}

/// Compiles and evaluates `source` in one step.
pub fn evaluate(source: &str, inputs: &[f64]) -> Result<f64, CalcError> {
    compile(source)?.evaluate(inputs)
}
