//! Infix-to-postfix compilation.
//!
//! A small Pratt parser walks the token stream and emits [`Op`]s directly,
//! so no syntax tree is ever built. Binding powers, loosest first:
//!
//! | operators                  | associativity |
//! |----------------------------|---------------|
//! | `? :`                      | right         |
//! | `\|\|`                     | left          |
//! | `&&`                       | left          |
//! | `\|` `OR` `XOR`            | left          |
//! | `&` `AND`                  | left          |
//! | `==` `=` `!=` `#`          | left          |
//! | `<` `<=` `>` `>=`          | left          |
//! | `<<` `>>`                  | left          |
//! | `+` `-`                    | left          |
//! | `*` `/` `%`                | left          |
//! | unary `-` `+` `!` `~`      | prefix        |
//! | `^` `**`                   | right         |

use smol_str::SmolStr;
use text_size::{TextRange, TextSize};

use crate::lexer::{tokenize, Token, TokenKind};
use crate::program::{BinaryOp, Op, Program, UnaryOp, MAX_INPUTS};
use crate::CalcError;

const TERNARY_BP: u8 = 2;
const PREFIX_BP: u8 = 21;

/// Compiles an infix calc expression.
pub fn compile(source: &str) -> Result<Program, CalcError> {
    let tokens = tokenize(source);
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        ops: Vec::new(),
    };
    if parser.tokens.is_empty() {
        return Err(parser.error_at_end("empty expression"));
    }
    parser.expr(0)?;
    if let Some(token) = parser.peek() {
        return Err(syntax(
            format!("unexpected `{}`", parser.text(token)),
            token.range,
        ));
    }
    Ok(Program::new(source, parser.ops))
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    ops: Vec<Op>,
}

#[derive(Clone, Copy)]
enum Function {
    Unary(UnaryOp),
    Binary(BinaryOp),
    Max,
    Min,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|token| token.kind)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn text(&self, token: Token) -> &str {
        &self.source[token.range]
    }

    fn error_at_end(&self, message: &str) -> CalcError {
        let end = TextSize::of(self.source);
        syntax(message.to_string(), TextRange::empty(end))
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, CalcError> {
        match self.bump() {
            Some(token) if token.kind == kind => Ok(token),
            Some(token) => Err(syntax(
                format!("expected {what}, found `{}`", self.text(token)),
                token.range,
            )),
            None => Err(self.error_at_end(&format!("expected {what}"))),
        }
    }

    fn expr(&mut self, min_bp: u8) -> Result<(), CalcError> {
        self.prefix()?;
        loop {
            let Some(token) = self.peek() else {
                break;
            };
            if token.kind == TokenKind::Question {
                if TERNARY_BP < min_bp {
                    break;
                }
                self.bump();
                self.expr(0)?;
                self.expect(TokenKind::Colon, "`:`")?;
                self.expr(TERNARY_BP)?;
                self.ops.push(Op::Select);
                continue;
            }
            let Some((op, left_bp, right_bp)) = self.infix(token) else {
                break;
            };
            if left_bp < min_bp {
                break;
            }
            self.bump();
            self.expr(right_bp)?;
            self.ops.push(Op::Binary(op));
        }
        Ok(())
    }

    fn infix(&self, token: Token) -> Option<(BinaryOp, u8, u8)> {
        let (op, bp) = match token.kind {
            TokenKind::PipePipe => (BinaryOp::Or, 3),
            TokenKind::AmpAmp => (BinaryOp::And, 5),
            TokenKind::Pipe => (BinaryOp::BitOr, 7),
            TokenKind::Amp => (BinaryOp::BitAnd, 9),
            TokenKind::Equal => (BinaryOp::Eq, 11),
            TokenKind::NotEqual => (BinaryOp::Ne, 11),
            TokenKind::Less => (BinaryOp::Lt, 13),
            TokenKind::LessEq => (BinaryOp::Le, 13),
            TokenKind::Greater => (BinaryOp::Gt, 13),
            TokenKind::GreaterEq => (BinaryOp::Ge, 13),
            TokenKind::Shl => (BinaryOp::Shl, 15),
            TokenKind::Shr => (BinaryOp::Shr, 15),
            TokenKind::Plus => (BinaryOp::Add, 17),
            TokenKind::Minus => (BinaryOp::Sub, 17),
            TokenKind::Star => (BinaryOp::Mul, 19),
            TokenKind::Slash => (BinaryOp::Div, 19),
            TokenKind::Percent => (BinaryOp::Rem, 19),
            TokenKind::Power => return Some((BinaryOp::Pow, 23, 23)),
            TokenKind::Ident => match self.text(token).to_ascii_uppercase().as_str() {
                "OR" => (BinaryOp::BitOr, 7),
                "XOR" => (BinaryOp::BitXor, 7),
                "AND" => (BinaryOp::BitAnd, 9),
                _ => return None,
            },
            _ => return None,
        };
        Some((op, bp, bp + 1))
    }

    fn prefix(&mut self) -> Result<(), CalcError> {
        let Some(token) = self.bump() else {
            return Err(self.error_at_end("expected operand"));
        };
        match token.kind {
            TokenKind::Number => {
                let value = self.text(token).parse::<f64>().map_err(|_| {
                    syntax(
                        format!("invalid number `{}`", self.text(token)),
                        token.range,
                    )
                })?;
                self.ops.push(Op::Const(value));
            }
            TokenKind::HexLiteral => {
                let digits = &self.text(token)[2..];
                let value = u64::from_str_radix(digits, 16).map_err(|_| {
                    syntax(
                        format!("invalid hex literal `{}`", self.text(token)),
                        token.range,
                    )
                })?;
                #[allow(clippy::cast_precision_loss)]
                let value = value as f64;
                self.ops.push(Op::Const(value));
            }
            TokenKind::LParen => {
                self.expr(0)?;
                self.expect(TokenKind::RParen, "`)`")?;
            }
            TokenKind::Minus => {
                self.expr(PREFIX_BP)?;
                self.ops.push(Op::Unary(UnaryOp::Neg));
            }
            TokenKind::Plus => self.expr(PREFIX_BP)?,
            TokenKind::Bang => {
                self.expr(PREFIX_BP)?;
                self.ops.push(Op::Unary(UnaryOp::Not));
            }
            TokenKind::Tilde => {
                self.expr(PREFIX_BP)?;
                self.ops.push(Op::Unary(UnaryOp::BitNot));
            }
            TokenKind::Ident => self.identifier(token)?,
            _ => {
                return Err(syntax(
                    format!("unexpected `{}`", self.text(token)),
                    token.range,
                ))
            }
        }
        Ok(())
    }

    fn identifier(&mut self, token: Token) -> Result<(), CalcError> {
        let name = self.text(token).to_ascii_uppercase();
        if self.peek_kind() == Some(TokenKind::LParen) {
            let function = function(&name).ok_or_else(|| {
                syntax(format!("unknown function `{name}`"), token.range)
            })?;
            return self.call(function, &name, token.range);
        }
        if let Some(index) = input_index(&name) {
            self.ops.push(Op::Input(index));
            return Ok(());
        }
        let value = match name.as_str() {
            "PI" => std::f64::consts::PI,
            "D2R" => std::f64::consts::PI / 180.0,
            "R2D" => 180.0 / std::f64::consts::PI,
            _ => {
                return Err(syntax(
                    format!("unknown identifier `{}`", self.text(token)),
                    token.range,
                ))
            }
        };
        self.ops.push(Op::Const(value));
        Ok(())
    }

    fn call(&mut self, function: Function, name: &str, range: TextRange) -> Result<(), CalcError> {
        self.expect(TokenKind::LParen, "`(`")?;
        let mut count = 0usize;
        if self.peek_kind() != Some(TokenKind::RParen) {
            loop {
                self.expr(0)?;
                count += 1;
                if self.peek_kind() == Some(TokenKind::Comma) {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        let close = self.expect(TokenKind::RParen, "`)`")?;
        let range = range.cover(close.range);
        let arity_error =
            |expected: &str| syntax(format!("{name} takes {expected}, got {count}"), range);
        match function {
            Function::Unary(op) => {
                if count != 1 {
                    return Err(arity_error("one argument"));
                }
                self.ops.push(Op::Unary(op));
            }
            Function::Binary(op) => {
                if count != 2 {
                    return Err(arity_error("two arguments"));
                }
                self.ops.push(Op::Binary(op));
            }
            Function::Max | Function::Min => {
                let Some(count) = u8::try_from(count).ok().filter(|count| *count > 0) else {
                    return Err(arity_error("between 1 and 255 arguments"));
                };
                self.ops.push(if matches!(function, Function::Max) {
                    Op::Max(count)
                } else {
                    Op::Min(count)
                });
            }
        }
        Ok(())
    }
}

fn function(name: &str) -> Option<Function> {
    let function = match name {
        "ABS" => Function::Unary(UnaryOp::Abs),
        "SQRT" | "SQR" => Function::Unary(UnaryOp::Sqrt),
        "EXP" => Function::Unary(UnaryOp::Exp),
        "LN" => Function::Unary(UnaryOp::Ln),
        "LOG" => Function::Unary(UnaryOp::Log10),
        "SIN" => Function::Unary(UnaryOp::Sin),
        "COS" => Function::Unary(UnaryOp::Cos),
        "TAN" => Function::Unary(UnaryOp::Tan),
        "ASIN" => Function::Unary(UnaryOp::Asin),
        "ACOS" => Function::Unary(UnaryOp::Acos),
        "ATAN" => Function::Unary(UnaryOp::Atan),
        "FLOOR" => Function::Unary(UnaryOp::Floor),
        "CEIL" => Function::Unary(UnaryOp::Ceil),
        "NINT" => Function::Unary(UnaryOp::Nint),
        "ISNAN" => Function::Unary(UnaryOp::IsNan),
        "NOT" => Function::Unary(UnaryOp::BitNot),
        "ATAN2" => Function::Binary(BinaryOp::Atan2),
        "MAX" => Function::Max,
        "MIN" => Function::Min,
        _ => return None,
    };
    Some(function)
}

fn input_index(name: &str) -> Option<u8> {
    let [letter] = name.as_bytes() else {
        return None;
    };
    let index = letter.checked_sub(b'A')?;
    (usize::from(index) < MAX_INPUTS).then_some(index)
}

fn syntax(message: String, range: TextRange) -> CalcError {
    CalcError::Syntax {
        message: SmolStr::new(message),
        range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn postfix(source: &str) -> String {
        compile(source).expect("compile").to_string()
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(postfix("A+B*C"), "A B C * +");
        assert_eq!(postfix("(A+B)*C"), "A B + C *");
    }

    #[test]
    fn subtraction_is_left_associative() {
        assert_eq!(postfix("A-B-C"), "A B - C -");
    }

    #[test]
    fn power_is_right_associative_and_beats_negation() {
        assert_eq!(postfix("A^B^C"), "A B C ^ ^");
        assert_eq!(postfix("-A^2"), "A 2 ^ NEG");
    }

    #[test]
    fn ternary_nests_to_the_right() {
        assert_eq!(postfix("A?B:C?D:E"), "A B C D E ?: ?:");
    }

    #[test]
    fn lowercase_inputs_are_accepted() {
        assert_eq!(postfix("a # 0"), "A 0 !=");
    }

    #[test]
    fn keyword_operators() {
        assert_eq!(postfix("A AND 4 XOR B"), "A 4 & B XOR");
    }

    #[test]
    fn syntax_error_points_at_offending_token() {
        let err = compile("A + * B").expect_err("should fail");
        match err {
            CalcError::Syntax { range, .. } => {
                assert_eq!(range, TextRange::new(4.into(), 5.into()));
            }
            CalcError::Eval(_) => panic!("expected syntax error"),
        }
    }

    #[test]
    fn inputs_beyond_p_are_unknown() {
        assert!(compile("Q+1").is_err());
    }

    #[test]
    fn wrong_arity_is_rejected() {
        assert!(compile("ABS(A,B)").is_err());
        assert!(compile("ATAN2(A)").is_err());
        assert!(compile("MAX()").is_err());
    }
}
