//! Lexer for calc expressions.
//!
//! Calc expressions are the small infix formulas attached to display
//! elements (`A+B>3`, `(A&4)#0`, `MAX(A,B,C)`). Inputs are single letters
//! `A`..`P`; everything else is a number, an operator, a function name or a
//! named constant.

use logos::Logos;
use text_size::{TextRange, TextSize};

/// All token kinds that can appear in a calc expression.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Default)]
pub enum TokenKind {
    /// Whitespace (spaces, tabs, newlines)
    #[regex(r"[ \t\r\n]+")]
    Whitespace,

    /// `(`
    #[token("(")]
    LParen,

    /// `)`
    #[token(")")]
    RParen,

    /// `,`
    #[token(",")]
    Comma,

    /// `?`
    #[token("?")]
    Question,

    /// `:`
    #[token(":")]
    Colon,

    /// `+`
    #[token("+")]
    Plus,

    /// `-`
    #[token("-")]
    Minus,

    /// `*`
    #[token("*")]
    Star,

    /// `/`
    #[token("/")]
    Slash,

    /// `%`
    #[token("%")]
    Percent,

    /// `^` or `**`
    #[token("^")]
    #[token("**")]
    Power,

    /// `<`
    #[token("<")]
    Less,

    /// `<=`
    #[token("<=")]
    LessEq,

    /// `>`
    #[token(">")]
    Greater,

    /// `>=`
    #[token(">=")]
    GreaterEq,

    /// `=` or `==`
    #[token("=")]
    #[token("==")]
    Equal,

    /// `#` or `!=`
    #[token("#")]
    #[token("!=")]
    NotEqual,

    /// `!`
    #[token("!")]
    Bang,

    /// `~`
    #[token("~")]
    Tilde,

    /// `&`
    #[token("&")]
    Amp,

    /// `&&`
    #[token("&&")]
    AmpAmp,

    /// `|`
    #[token("|")]
    Pipe,

    /// `||`
    #[token("||")]
    PipePipe,

    /// `<<`
    #[token("<<")]
    Shl,

    /// `>>`
    #[token(">>")]
    Shr,

    /// Hexadecimal literal: 0x1F
    #[regex(r"0[xX][0-9A-Fa-f]+")]
    HexLiteral,

    /// Decimal literal: 3, 3.5, .5, 1e-3
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?")]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?")]
    Number,

    /// Input letter, function name, keyword operator or named constant.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    /// Unrecognized input.
    #[default]
    Error,
}

impl TokenKind {
    /// Returns true for tokens the parser never sees.
    #[must_use]
    pub fn is_trivia(self) -> bool {
        matches!(self, Self::Whitespace)
    }
}

/// A token with its byte range in the expression text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub range: TextRange,
}

/// Tokenizes `source`, dropping trivia.
pub fn tokenize(source: &str) -> Vec<Token> {
    TokenKind::lexer(source)
        .spanned()
        .map(|(kind, span)| Token {
            kind: kind.unwrap_or(TokenKind::Error),
            range: TextRange::new(
                TextSize::from(span.start as u32),
                TextSize::from(span.end as u32),
            ),
        })
        .filter(|token| !token.kind.is_trivia())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(
            kinds("A**2 >= B && C != D"),
            vec![
                TokenKind::Ident,
                TokenKind::Power,
                TokenKind::Number,
                TokenKind::GreaterEq,
                TokenKind::Ident,
                TokenKind::AmpAmp,
                TokenKind::Ident,
                TokenKind::NotEqual,
                TokenKind::Ident,
            ]
        );
    }

    #[test]
    fn hex_and_decimal_literals() {
        assert_eq!(
            kinds("0x1F 1.5e3 .25 7"),
            vec![
                TokenKind::HexLiteral,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
            ]
        );
    }

    #[test]
    fn unknown_characters_become_errors() {
        assert!(kinds("A @ B").contains(&TokenKind::Error));
    }
}
