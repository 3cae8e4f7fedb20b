//! SQL Lexer (Tokenizer)
//!
//! This module converts query strings into a stream of tokens, each tagged
//! with the character offset where it starts.

use super::token::{SpannedToken, Token};
use crate::error::{Error, Result};

/// SQL Lexer
pub struct Lexer {
    /// Input characters
    input: Vec<char>,
    /// Current position in input
    position: usize,
}

impl Lexer {
    /// Create a new lexer for the given input
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Tokenize the entire input; the last token is always `Eof`
    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>> {
        let mut tokens: Vec<SpannedToken> = Vec::new();

        loop {
            self.skip_trivia();
            let position = self.position;
            let token = self.next_token(tokens.last().map(|t| &t.token))?;
            let done = token == Token::Eof;
            tokens.push(SpannedToken { token, position });
            if done {
                break;
            }
        }

        Ok(tokens)
    }

    fn unexpected(&self, found: impl Into<String>, position: usize, expected: &str) -> Error {
        Error::SyntaxError {
            token: found.into(),
            position,
            expected: expected.to_string(),
        }
    }

    /// Get the next token from the input
    fn next_token(&mut self, previous: Option<&Token>) -> Result<Token> {
        if self.is_at_end() {
            return Ok(Token::Eof);
        }

        let start = self.position;
        let ch = self.current_char();
        self.advance();

        let token = match ch {
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            '.' => Token::Dot,
            '+' => Token::Plus,
            '*' => Token::Asterisk,
            '/' => Token::Slash,
            '=' => Token::Eq,
            '-' => {
                // Negative number, unless the minus follows an operand
                let signed = !previous.is_some_and(ends_operand);
                if signed && !self.is_at_end() && self.current_char().is_ascii_digit() {
                    return match self.read_number(start, previous)? {
                        Token::IntegerLiteral(n) => Ok(Token::IntegerLiteral(-n)),
                        Token::FloatLiteral(n) => Ok(Token::FloatLiteral(-n)),
                        other => Ok(other),
                    };
                }
                Token::Minus
            }
            '<' => match self.peek_current() {
                Some('=') => {
                    self.advance();
                    Token::Lte
                }
                Some('>') => {
                    self.advance();
                    Token::Neq
                }
                _ => Token::Lt,
            },
            '>' => {
                if self.peek_current() == Some('=') {
                    self.advance();
                    Token::Gte
                } else {
                    Token::Gt
                }
            }
            '!' => {
                if self.peek_current() == Some('=') {
                    self.advance();
                    Token::Neq
                } else {
                    return Err(self.unexpected("!", start, "'!='"));
                }
            }
            '\'' => return self.read_string(start),
            '"' => return self.read_quoted_identifier(start),
            c if c.is_ascii_digit() => {
                self.position = start;
                return self.read_number(start, previous);
            }
            c if c.is_alphabetic() || c == '_' => {
                self.position = start;
                return Ok(self.read_identifier());
            }
            other => return Err(self.unexpected(other.to_string(), start, "a token")),
        };

        Ok(token)
    }

    /// Check if we've reached the end of input
    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    /// Get the current character
    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn peek_current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    /// Peek at the next character
    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    /// Advance to the next character
    fn advance(&mut self) {
        self.position += 1;
    }

    /// Skip whitespace and comments (-- and /* */)
    fn skip_trivia(&mut self) {
        loop {
            while !self.is_at_end() && self.current_char().is_whitespace() {
                self.advance();
            }

            if self.is_at_end() {
                return;
            }

            if self.current_char() == '-' && self.peek_char() == Some('-') {
                while !self.is_at_end() && self.current_char() != '\n' {
                    self.advance();
                }
            } else if self.current_char() == '/' && self.peek_char() == Some('*') {
                self.position += 2;
                while !self.is_at_end()
                    && !(self.current_char() == '*' && self.peek_char() == Some('/'))
                {
                    self.advance();
                }
                self.position = (self.position + 2).min(self.input.len());
            } else {
                return;
            }
        }
    }

    /// Read a string literal (single-quoted); the opening quote is consumed
    fn read_string(&mut self, start: usize) -> Result<Token> {
        let mut value = String::new();

        while !self.is_at_end() {
            let ch = self.current_char();
            self.advance();

            if ch == '\'' {
                // Escaped quote ''
                if self.peek_current() == Some('\'') {
                    value.push('\'');
                    self.advance();
                } else {
                    return Ok(Token::StringLiteral(value));
                }
            } else {
                value.push(ch);
            }
        }

        Err(self.unexpected("'", start, "a closing quote"))
    }

    /// Read a quoted identifier (double-quoted); the opening quote is consumed
    fn read_quoted_identifier(&mut self, start: usize) -> Result<Token> {
        let mut value = String::new();

        while !self.is_at_end() {
            let ch = self.current_char();
            self.advance();

            if ch == '"' {
                if self.peek_current() == Some('"') {
                    value.push('"');
                    self.advance();
                } else {
                    return Ok(Token::Identifier(value));
                }
            } else {
                value.push(ch);
            }
        }

        Err(self.unexpected("\"", start, "a closing quote"))
    }

    /// Read a number (integer or float)
    fn read_number(&mut self, start: usize, previous: Option<&Token>) -> Result<Token> {
        let mut value = String::new();
        let mut is_float = false;

        while !self.is_at_end() {
            let ch = self.current_char();

            if ch.is_ascii_digit() {
                value.push(ch);
                self.advance();
            } else if ch == '.' && !is_float && self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                value.push(ch);
                self.advance();
            } else if (ch == 'e' || ch == 'E') && !value.is_empty() {
                // Scientific notation
                is_float = true;
                value.push(ch);
                self.advance();

                if !self.is_at_end() && (self.current_char() == '+' || self.current_char() == '-') {
                    value.push(self.current_char());
                    self.advance();
                }
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();
        if is_float {
            value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Token::FloatLiteral)
                .ok_or_else(|| self.unexpected(text, start, "a number"))
        } else {
            value.parse::<i64>().map(Token::IntegerLiteral).map_err(|_| {
                if previous == Some(&Token::Limit) {
                    Error::InvalidLimit(text)
                } else {
                    self.unexpected(text, start, "a 64-bit integer")
                }
            })
        }
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        let mut value = String::new();

        while !self.is_at_end() {
            let ch = self.current_char();

            if ch.is_alphanumeric() || ch == '_' {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        Token::from_keyword(&value).unwrap_or(Token::Identifier(value))
    }
}

/// Tokens after which `-` is a binary minus rather than a sign
fn ends_operand(token: &Token) -> bool {
    matches!(
        token,
        Token::IntegerLiteral(_)
            | Token::FloatLiteral(_)
            | Token::StringLiteral(_)
            | Token::Identifier(_)
            | Token::RParen
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(sql: &str) -> Vec<Token> {
        Lexer::new(sql)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_simple_select() {
        assert_eq!(
            tokens("SELECT * FROM users"),
            vec![
                Token::Select,
                Token::Asterisk,
                Token::From,
                Token::Identifier("users".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_positions() {
        let spanned = Lexer::new("SELECT name FROM  users").tokenize().unwrap();
        let positions: Vec<usize> = spanned.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 7, 12, 18, 23]);
    }

    #[test]
    fn test_qualified_join() {
        assert_eq!(
            tokens("users.id = orders.user_id"),
            vec![
                Token::Identifier("users".to_string()),
                Token::Dot,
                Token::Identifier("id".to_string()),
                Token::Eq,
                Token::Identifier("orders".to_string()),
                Token::Dot,
                Token::Identifier("user_id".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(
            tokens("'it''s a test'"),
            vec![Token::StringLiteral("it's a test".to_string()), Token::Eof]
        );
    }

    #[test]
    fn test_comparison_operators() {
        let toks = tokens("a < b <= c > d >= e <> f != g");

        assert!(toks.contains(&Token::Lt));
        assert!(toks.contains(&Token::Lte));
        assert!(toks.contains(&Token::Gt));
        assert!(toks.contains(&Token::Gte));
        assert_eq!(toks.iter().filter(|t| **t == Token::Neq).count(), 2);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("3.14, -5, 2.5e2 7"),
            vec![
                Token::FloatLiteral(3.14),
                Token::Comma,
                Token::IntegerLiteral(-5),
                Token::Comma,
                Token::FloatLiteral(250.0),
                Token::IntegerLiteral(7),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_minus_after_operand() {
        assert_eq!(
            tokens("age > 2 -1"),
            vec![
                Token::Identifier("age".to_string()),
                Token::Gt,
                Token::IntegerLiteral(2),
                Token::Minus,
                Token::IntegerLiteral(1),
                Token::Eof,
            ]
        );
        assert_eq!(
            tokens("age-1"),
            vec![
                Token::Identifier("age".to_string()),
                Token::Minus,
                Token::IntegerLiteral(1),
                Token::Eof,
            ]
        );
        assert_eq!(
            tokens("age >= -1.5"),
            vec![
                Token::Identifier("age".to_string()),
                Token::Gte,
                Token::FloatLiteral(-1.5),
                Token::Eof,
            ]
        );
        assert_eq!(
            tokens("LIMIT -3")[1],
            Token::IntegerLiteral(-3)
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            tokens("SELECT -- pick everything\n* /* all */ FROM users"),
            vec![
                Token::Select,
                Token::Asterisk,
                Token::From,
                Token::Identifier("users".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_lexer_errors() {
        let err = Lexer::new("SELECT 'open").tokenize().unwrap_err();
        assert!(matches!(err, Error::SyntaxError { position: 7, .. }));

        let err = Lexer::new("SELECT # FROM t").tokenize().unwrap_err();
        assert_eq!(
            err,
            Error::SyntaxError {
                token: "#".to_string(),
                position: 7,
                expected: "a token".to_string(),
            }
        );

        let err = Lexer::new("age = 99999999999999999999").tokenize().unwrap_err();
        assert!(matches!(err, Error::SyntaxError { position: 6, .. }));

        let err = Lexer::new("LIMIT 99999999999999999999").tokenize().unwrap_err();
        assert_eq!(err, Error::InvalidLimit("99999999999999999999".to_string()));
    }
}
