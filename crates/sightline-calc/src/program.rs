//! Compiled postfix programs and their evaluation.

use std::fmt;

use smol_str::SmolStr;

use crate::CalcError;

/// Highest number of inputs a program can address (`A`..`P`).
pub const MAX_INPUTS: usize = 16;

/// Unary operators and single-argument functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    Abs,
    Sqrt,
    Exp,
    Ln,
    Log10,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Floor,
    Ceil,
    Nint,
    IsNan,
}

/// Binary operators and two-argument functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Atan2,
}

/// One postfix instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Const(f64),
    Input(u8),
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Pops `count` values and pushes the largest.
    Max(u8),
    /// Pops `count` values and pushes the smallest.
    Min(u8),
    /// Pops condition, then-value and else-value; pushes the selected one.
    Select,
}

/// A compiled calc expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    source: SmolStr,
    ops: Vec<Op>,
    inputs: u16,
}

impl Program {
    pub(crate) fn new(source: &str, ops: Vec<Op>) -> Self {
        let inputs = ops.iter().fold(0u16, |mask, op| match op {
            Op::Input(index) => mask | (1 << index),
            _ => mask,
        });
        Self {
            source: SmolStr::new(source.trim()),
            ops,
            inputs,
        }
    }

    /// The expression text this program was compiled from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Returns true when the program reads input `index` (0 = `A`).
    #[must_use]
    pub fn uses_input(&self, index: usize) -> bool {
        index < MAX_INPUTS && self.inputs & (1 << index) != 0
    }

    /// Evaluates the program against `inputs`, where `inputs[0]` is `A`.
    ///
    /// Inputs the program reads beyond the end of the slice are an error;
    /// unused trailing inputs may be omitted.
    pub fn evaluate(&self, inputs: &[f64]) -> Result<f64, CalcError> {
        let mut stack: Vec<f64> = Vec::with_capacity(self.ops.len());
        for op in &self.ops {
            match *op {
                Op::Const(value) => stack.push(value),
                Op::Input(index) => {
                    let value = inputs.get(usize::from(index)).copied().ok_or_else(|| {
                        CalcError::Eval(
                            format!("input {} not supplied", input_letter(index)).into(),
                        )
                    })?;
                    stack.push(value);
                }
                Op::Unary(op) => {
                    let value = pop(&mut stack)?;
                    stack.push(apply_unary(op, value));
                }
                Op::Binary(op) => {
                    let right = pop(&mut stack)?;
                    let left = pop(&mut stack)?;
                    stack.push(apply_binary(op, left, right)?);
                }
                Op::Max(count) | Op::Min(count) => {
                    let mut result = pop(&mut stack)?;
                    for _ in 1..count {
                        let value = pop(&mut stack)?;
                        result = if matches!(op, Op::Max(_)) {
                            result.max(value)
                        } else {
                            result.min(value)
                        };
                    }
                    stack.push(result);
                }
                Op::Select => {
                    let otherwise = pop(&mut stack)?;
                    let then = pop(&mut stack)?;
                    let condition = pop(&mut stack)?;
                    stack.push(if condition != 0.0 { then } else { otherwise });
                }
            }
        }
        let result = pop(&mut stack)?;
        if !stack.is_empty() {
            return Err(CalcError::Eval("unbalanced program stack".into()));
        }
        if result.is_nan() {
            return Err(CalcError::Eval("result is not a number".into()));
        }
        Ok(result)
    }
}

fn pop(stack: &mut Vec<f64>) -> Result<f64, CalcError> {
    stack
        .pop()
        .ok_or_else(|| CalcError::Eval("program stack underflow".into()))
}

fn truth(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[allow(clippy::cast_possible_truncation)]
fn as_bits(value: f64) -> i64 {
    value as i64
}

#[allow(clippy::cast_precision_loss)]
fn from_bits(value: i64) -> f64 {
    value as f64
}

fn apply_unary(op: UnaryOp, value: f64) -> f64 {
    match op {
        UnaryOp::Neg => -value,
        UnaryOp::Not => truth(value == 0.0),
        UnaryOp::BitNot => from_bits(!as_bits(value)),
        UnaryOp::Abs => value.abs(),
        UnaryOp::Sqrt => value.sqrt(),
        UnaryOp::Exp => value.exp(),
        UnaryOp::Ln => value.ln(),
        UnaryOp::Log10 => value.log10(),
        UnaryOp::Sin => value.sin(),
        UnaryOp::Cos => value.cos(),
        UnaryOp::Tan => value.tan(),
        UnaryOp::Asin => value.asin(),
        UnaryOp::Acos => value.acos(),
        UnaryOp::Atan => value.atan(),
        UnaryOp::Floor => value.floor(),
        UnaryOp::Ceil => value.ceil(),
        UnaryOp::Nint => value.round(),
        UnaryOp::IsNan => truth(value.is_nan()),
    }
}

fn apply_binary(op: BinaryOp, left: f64, right: f64) -> Result<f64, CalcError> {
    let value = match op {
        BinaryOp::Add => left + right,
        BinaryOp::Sub => left - right,
        BinaryOp::Mul => left * right,
        BinaryOp::Div => {
            if right == 0.0 {
                return Err(CalcError::Eval("division by zero".into()));
            }
            left / right
        }
        BinaryOp::Rem => {
            let divisor = as_bits(right);
            if divisor == 0 {
                return Err(CalcError::Eval("modulo by zero".into()));
            }
            let rem = as_bits(left)
                .checked_rem(divisor)
                .ok_or_else(|| CalcError::Eval("modulo overflow".into()))?;
            from_bits(rem)
        }
        BinaryOp::Pow => left.powf(right),
        BinaryOp::Lt => truth(left < right),
        BinaryOp::Le => truth(left <= right),
        BinaryOp::Gt => truth(left > right),
        BinaryOp::Ge => truth(left >= right),
        #[allow(clippy::float_cmp)]
        BinaryOp::Eq => truth(left == right),
        #[allow(clippy::float_cmp)]
        BinaryOp::Ne => truth(left != right),
        BinaryOp::And => truth(left != 0.0 && right != 0.0),
        BinaryOp::Or => truth(left != 0.0 || right != 0.0),
        BinaryOp::BitAnd => from_bits(as_bits(left) & as_bits(right)),
        BinaryOp::BitOr => from_bits(as_bits(left) | as_bits(right)),
        BinaryOp::BitXor => from_bits(as_bits(left) ^ as_bits(right)),
        BinaryOp::Shl => from_bits(as_bits(left).wrapping_shl(shift_amount(right))),
        BinaryOp::Shr => from_bits(as_bits(left).wrapping_shr(shift_amount(right))),
        BinaryOp::Atan2 => left.atan2(right),
    };
    Ok(value)
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn shift_amount(value: f64) -> u32 {
    (as_bits(value).clamp(0, 63)) as u32
}

pub(crate) fn input_letter(index: u8) -> char {
    char::from(b'A' + index)
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Const(value) => write!(f, "{value}"),
            Op::Input(index) => write!(f, "{}", input_letter(*index)),
            Op::Unary(op) => f.write_str(match op {
                UnaryOp::Neg => "NEG",
                UnaryOp::Not => "!",
                UnaryOp::BitNot => "~",
                UnaryOp::Abs => "ABS",
                UnaryOp::Sqrt => "SQRT",
                UnaryOp::Exp => "EXP",
                UnaryOp::Ln => "LN",
                UnaryOp::Log10 => "LOG",
                UnaryOp::Sin => "SIN",
                UnaryOp::Cos => "COS",
                UnaryOp::Tan => "TAN",
                UnaryOp::Asin => "ASIN",
                UnaryOp::Acos => "ACOS",
                UnaryOp::Atan => "ATAN",
                UnaryOp::Floor => "FLOOR",
                UnaryOp::Ceil => "CEIL",
                UnaryOp::Nint => "NINT",
                UnaryOp::IsNan => "ISNAN",
            }),
            Op::Binary(op) => f.write_str(match op {
                BinaryOp::Add => "+",
                BinaryOp::Sub => "-",
                BinaryOp::Mul => "*",
                BinaryOp::Div => "/",
                BinaryOp::Rem => "%",
                BinaryOp::Pow => "^",
                BinaryOp::Lt => "<",
                BinaryOp::Le => "<=",
                BinaryOp::Gt => ">",
                BinaryOp::Ge => ">=",
                BinaryOp::Eq => "==",
                BinaryOp::Ne => "!=",
                BinaryOp::And => "&&",
                BinaryOp::Or => "||",
                BinaryOp::BitAnd => "&",
                BinaryOp::BitOr => "|",
                BinaryOp::BitXor => "XOR",
                BinaryOp::Shl => "<<",
                BinaryOp::Shr => ">>",
                BinaryOp::Atan2 => "ATAN2",
            }),
            Op::Max(count) => write!(f, "MAX/{count}"),
            Op::Min(count) => write!(f, "MIN/{count}"),
            Op::Select => f.write_str("?:"),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, op) in self.ops.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{op}")?;
        }
        Ok(())
    }
}
