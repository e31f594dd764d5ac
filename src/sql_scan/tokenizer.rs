//! Flat SQL tokenization.
//!
//! Wraps the `sqlparser` tokenizer and reduces its tokens to the five kinds the
//! identifier classifier needs. Order, whitespace and punctuation are kept so
//! callers can look behind and ahead.

use crate::dialect::Dialect;
use crate::sql_scan::keywords::is_keyword;
use sqlparser::tokenizer::{Token as SqlToken, Tokenizer};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Name,
    Punctuation,
    Whitespace,
    Literal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn is_whitespace(&self) -> bool {
        self.kind == TokenKind::Whitespace
    }

    pub fn is_name(&self) -> bool {
        self.kind == TokenKind::Name
    }

    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == TokenKind::Punctuation && self.text == text
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text.eq_ignore_ascii_case(word)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The input is not tokenizable SQL (unterminated string, stray quote...).
    #[error("malformed SQL: {0}")]
    Malformed(String),

    /// The scanner itself failed; says nothing about the input.
    #[error("scanner failure: {0}")]
    Internal(String),
}

/// Turns SQL text into a flat token stream.
pub trait SqlLexer: Send + Sync {
    fn tokenize(&self, sql: &str) -> std::result::Result<Vec<Token>, ScanError>;
}

/// Lexer backed by the `sqlparser` tokenizer for a given dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialectLexer {
    dialect: Dialect,
}

impl DialectLexer {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }
}

impl SqlLexer for DialectLexer {
    fn tokenize(&self, sql: &str) -> std::result::Result<Vec<Token>, ScanError> {
        let dialect = self.dialect.tokenizer_dialect();
        let raw = Tokenizer::new(&*dialect, sql)
            .tokenize()
            .map_err(|e| ScanError::Malformed(e.to_string()))?;
        Ok(raw.into_iter().filter_map(convert).collect())
    }
}

fn convert(token: SqlToken) -> Option<Token> {
    let converted = match token {
        SqlToken::EOF => return None,
        SqlToken::Word(word) => {
            let kind = if word.quote_style.is_none() && is_keyword(&word.value) {
                TokenKind::Keyword
            } else {
                TokenKind::Name
            };
            Token::new(kind, word.value)
        }
        SqlToken::Whitespace(ws) => Token::new(TokenKind::Whitespace, ws.to_string()),
        SqlToken::Number(ref text, _) => Token::new(TokenKind::Literal, text.clone()),
        SqlToken::SingleQuotedString(_)
        | SqlToken::DoubleQuotedString(_)
        | SqlToken::NationalStringLiteral(_)
        | SqlToken::EscapedStringLiteral(_)
        | SqlToken::HexStringLiteral(_)
        | SqlToken::Placeholder(_) => Token::new(TokenKind::Literal, token.to_string()),
        other => Token::new(TokenKind::Punctuation, other.to_string()),
    };
    Some(converted)
}

/// Split a token stream into statements on `;`.
pub fn split_statements(tokens: &[Token]) -> Vec<&[Token]> {
    tokens
        .split(|t| t.is_punct(";"))
        .filter(|stmt| stmt.iter().any(|t| !t.is_whitespace()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<(TokenKind, String)> {
        DialectLexer::new(Dialect::ClickHouse)
            .tokenize(sql)
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_whitespace())
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_tokenize_classifies_kinds() {
        let tokens = kinds("SELECT grand_total FROM internal.realtime_order WHERE id = 10");
        assert_eq!(tokens[0], (TokenKind::Keyword, "SELECT".to_string()));
        assert_eq!(tokens[1], (TokenKind::Name, "grand_total".to_string()));
        assert_eq!(tokens[4], (TokenKind::Punctuation, ".".to_string()));
        assert_eq!(tokens.last().unwrap(), &(TokenKind::Literal, "10".to_string()));
    }

    #[test]
    fn test_quoted_keyword_is_a_name() {
        let tokens = kinds("SELECT \"date\" FROM t");
        assert_eq!(tokens[1], (TokenKind::Name, "date".to_string()));
    }

    #[test]
    fn test_unterminated_string_is_malformed() {
        let result = DialectLexer::new(Dialect::ClickHouse).tokenize("SELECT 'abc FROM t");
        assert!(matches!(result, Err(ScanError::Malformed(_))));
    }

    #[test]
    fn test_split_statements_skips_empty() {
        let tokens = DialectLexer::default().tokenize("SELECT 1; ; SELECT 2;").unwrap();
        assert_eq!(split_statements(&tokens).len(), 2);
    }
}
