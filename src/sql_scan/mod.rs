//! Lightweight SQL scanning: tokenization and identifier classification.

pub mod identifiers;
pub mod keywords;
pub mod tokenizer;

pub use identifiers::{classify_tokens, extract_candidate_columns, IdentifierClassifier};
pub use keywords::is_keyword;
pub use tokenizer::{DialectLexer, ScanError, SqlLexer, Token, TokenKind};
