//! SQL Token definitions
//!
//! Tokens of the SELECT subset. Keywords outside the grammar (AND, GROUP,
//! DISTINCT, ...) still get their own variants so the parser can reject them
//! with a precise error instead of treating them as identifiers.

use std::fmt;

/// SQL Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Clause keywords
    Select,
    From,
    Where,
    Join,
    Inner,
    Left,
    Right,
    Full,
    Outer,
    Cross,
    On,
    Order,
    By,
    Asc,
    Desc,
    Limit,

    // Keywords recognized only to be rejected
    And,
    Or,
    Not,
    Group,
    Having,
    Offset,
    Distinct,
    As,

    IntegerLiteral(i64),
    FloatLiteral(f64),
    /// Single-quoted, with `''` unescaped
    StringLiteral(String),
    /// Table or column name, bare or double-quoted
    Identifier(String),

    Eq,
    /// `<>` or `!=`
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Minus,
    Asterisk,
    Slash,

    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,

    Eof,
}

/// A token with the character offset where it starts
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub position: usize,
}

const KEYWORDS: &[(&str, Token)] = &[
    ("SELECT", Token::Select),
    ("FROM", Token::From),
    ("WHERE", Token::Where),
    ("JOIN", Token::Join),
    ("INNER", Token::Inner),
    ("LEFT", Token::Left),
    ("RIGHT", Token::Right),
    ("FULL", Token::Full),
    ("OUTER", Token::Outer),
    ("CROSS", Token::Cross),
    ("ON", Token::On),
    ("ORDER", Token::Order),
    ("BY", Token::By),
    ("ASC", Token::Asc),
    ("DESC", Token::Desc),
    ("LIMIT", Token::Limit),
    ("AND", Token::And),
    ("OR", Token::Or),
    ("NOT", Token::Not),
    ("GROUP", Token::Group),
    ("HAVING", Token::Having),
    ("OFFSET", Token::Offset),
    ("DISTINCT", Token::Distinct),
    ("AS", Token::As),
];

impl Token {
    /// Keyword for `word`, matched case-insensitively
    pub fn from_keyword(word: &str) -> Option<Token> {
        KEYWORDS
            .iter()
            .find(|(keyword, _)| keyword.eq_ignore_ascii_case(word))
            .map(|(_, token)| token.clone())
    }

    fn keyword_text(&self) -> Option<&'static str> {
        KEYWORDS
            .iter()
            .find(|(_, token)| token == self)
            .map(|(keyword, _)| *keyword)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(keyword) = self.keyword_text() {
            return f.write_str(keyword);
        }
        match self {
            Token::IntegerLiteral(n) => write!(f, "{}", n),
            Token::FloatLiteral(n) => write!(f, "{:?}", n),
            Token::StringLiteral(s) => write!(f, "'{}'", s),
            Token::Identifier(s) => f.write_str(s),
            Token::Eq => f.write_str("="),
            Token::Neq => f.write_str("<>"),
            Token::Lt => f.write_str("<"),
            Token::Gt => f.write_str(">"),
            Token::Lte => f.write_str("<="),
            Token::Gte => f.write_str(">="),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Asterisk => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
            Token::Semicolon => f.write_str(";"),
            Token::Dot => f.write_str("."),
            Token::Eof => f.write_str("end of input"),
            _ => Ok(()),
        }
    }
}
