//! Candidate column extraction.
//!
//! A heuristic classifier, not a parser: it walks the flat token stream and
//! drops every name that looks like a keyword, function, table, qualifier or
//! alias. Whatever survives is treated as a column reference.

use crate::dialect::Dialect;
use crate::sql_scan::keywords::{is_clause_keyword, is_keyword};
use crate::sql_scan::tokenizer::{split_statements, DialectLexer, SqlLexer, Token, TokenKind};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Extract candidate columns using the default dialect tokenizer.
///
/// Returns an empty list when the SQL cannot be tokenized; callers must read
/// that as "cannot validate", not "no columns".
pub fn extract_candidate_columns(sql: &str, known_tables: &HashSet<String>) -> Vec<String> {
    IdentifierClassifier::new(Dialect::default()).candidate_columns(sql, known_tables)
}

pub struct IdentifierClassifier {
    lexer: Arc<dyn SqlLexer>,
}

impl IdentifierClassifier {
    pub fn new(dialect: Dialect) -> Self {
        Self::with_lexer(Arc::new(DialectLexer::new(dialect)))
    }

    pub fn with_lexer(lexer: Arc<dyn SqlLexer>) -> Self {
        Self { lexer }
    }

    pub fn candidate_columns(&self, sql: &str, known_tables: &HashSet<String>) -> Vec<String> {
        match self.lexer.tokenize(sql) {
            Ok(tokens) => classify_tokens(&tokens, known_tables),
            Err(e) => {
                debug!("Identifier extraction skipped: {}", e);
                Vec::new()
            }
        }
    }
}

/// Classify an already tokenized SQL string.
///
/// Output is deduplicated case-insensitively, keeping the first spelling, in
/// order of first appearance.
pub fn classify_tokens(tokens: &[Token], known_tables: &HashSet<String>) -> Vec<String> {
    let statements = split_statements(tokens);

    let mut aliases: HashSet<String> = HashSet::new();
    for stmt in &statements {
        for (i, token) in stmt.iter().enumerate() {
            if token.is_name() && is_alias(stmt, i) {
                aliases.insert(token.text.to_lowercase());
            }
        }
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut columns = Vec::new();
    for stmt in &statements {
        for (i, token) in stmt.iter().enumerate() {
            if !token.is_name() {
                continue;
            }
            let name = token.text.trim();
            if name.is_empty() || is_keyword(name) {
                continue;
            }
            if name.chars().all(|c| c.is_ascii_digit()) || name.chars().count() <= 1 {
                continue;
            }
            if is_qualifier_position(stmt, i) {
                continue;
            }
            if is_table_reference(name, known_tables) {
                continue;
            }
            let lower = name.to_lowercase();
            if aliases.contains(&lower) {
                continue;
            }
            if is_function_name(stmt, i) {
                continue;
            }
            if seen.insert(lower) {
                columns.push(name.to_string());
            }
        }
    }
    columns
}

fn prev_significant(tokens: &[Token], idx: usize) -> Option<usize> {
    (0..idx).rev().find(|&i| !tokens[i].is_whitespace())
}

fn next_significant(tokens: &[Token], idx: usize) -> Option<usize> {
    (idx + 1..tokens.len()).find(|&i| !tokens[i].is_whitespace())
}

/// Adjacent to a `.`: the schema part or the table part of `a.b`.
fn is_qualifier_position(tokens: &[Token], idx: usize) -> bool {
    let before = idx > 0 && tokens[idx - 1].is_punct(".");
    let after = tokens.get(idx + 1).map_or(false, |t| t.is_punct("."));
    before || after
}

fn is_function_name(tokens: &[Token], idx: usize) -> bool {
    next_significant(tokens, idx).map_or(false, |i| tokens[i].is_punct("("))
}

/// Known tables may be stored qualified (`db.table`); a bare name matches the
/// last segment.
fn is_table_reference(name: &str, known_tables: &HashSet<String>) -> bool {
    let lower = name.to_lowercase();
    if known_tables.contains(&lower) {
        return true;
    }
    let stripped = lower.rsplit('.').next().unwrap_or(&lower);
    known_tables
        .iter()
        .any(|t| t.rsplit('.').next().map_or(false, |last| last == stripped))
}

/// Nearest clause keyword at or before `idx`.
fn enclosing_clause(tokens: &[Token], idx: usize) -> Option<String> {
    (0..=idx)
        .rev()
        .map(|i| &tokens[i])
        .find(|t| t.kind == TokenKind::Keyword && is_clause_keyword(&t.text))
        .map(|t| t.text.to_uppercase())
}

/// An alias follows `AS`, or follows an expression (a name or a closing
/// parenthesis) inside a SELECT list. Bare names after a table in FROM/JOIN
/// are not aliases; only `AS` marks one there.
fn is_alias(tokens: &[Token], idx: usize) -> bool {
    let prev_idx = match prev_significant(tokens, idx) {
        Some(i) => i,
        None => return false,
    };
    let prev = &tokens[prev_idx];
    if prev.is_keyword("AS") {
        return true;
    }
    if !(prev.is_name() || prev.is_punct(")")) {
        return false;
    }
    enclosing_clause(tokens, prev_idx).as_deref() == Some("SELECT")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn columns(sql: &str, known: &[&str]) -> Vec<String> {
        extract_candidate_columns(sql, &tables(known))
    }

    #[test]
    fn test_select_with_alias_and_table() {
        let cols = columns("SELECT id, name AS n FROM customers WHERE id = 1", &["customers"]);
        assert_eq!(cols, vec!["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn test_function_names_are_excluded() {
        let cols = columns(
            "SELECT myUdf(grand_total), formatReadable (company_name) FROM orders",
            &["orders"],
        );
        assert_eq!(cols, vec!["grand_total".to_string(), "company_name".to_string()]);
    }

    #[test]
    fn test_qualified_names_are_excluded() {
        let cols = columns(
            "SELECT SUM(grand_total) FROM internal.realtime_order WHERE o.status = 'paid'",
            &[],
        );
        assert_eq!(cols, vec!["grand_total".to_string()]);
    }

    #[test]
    fn test_bare_table_matches_qualified_known_table() {
        let cols = columns(
            "SELECT company_name FROM realtime_order",
            &["internal.realtime_order"],
        );
        assert_eq!(cols, vec!["company_name".to_string()]);
    }

    #[test]
    fn test_implicit_alias_after_function_call() {
        let cols = columns(
            "SELECT company_name, SUM(grand_total) total FROM orders GROUP BY company_name ORDER BY total DESC",
            &["orders"],
        );
        assert_eq!(cols, vec!["company_name".to_string(), "grand_total".to_string()]);
    }

    #[test]
    fn test_bare_table_alias_in_join_is_a_candidate() {
        let cols = columns(
            "SELECT c.email FROM orders ord JOIN customers cu ON ord.customer_id = cu.id",
            &["orders", "customers"],
        );
        assert_eq!(cols, vec!["ord".to_string(), "cu".to_string()]);
    }

    #[test]
    fn test_from_clause_name_does_not_hide_columns() {
        let cols = columns("SELECT id FROM users usr WHERE usr.id = 1", &["users"]);
        assert_eq!(cols, vec!["id".to_string(), "usr".to_string()]);

        let cols = columns("SELECT id FROM users status WHERE status = 1", &["users"]);
        assert_eq!(cols, vec!["id".to_string(), "status".to_string()]);
    }

    #[test]
    fn test_as_alias_in_from_clause() {
        let cols = columns("SELECT u.id FROM users AS u2 WHERE u2.email <> ''", &["users"]);
        assert!(cols.is_empty(), "unexpected candidates: {:?}", cols);
    }

    #[test]
    fn test_deduplicates_case_insensitively() {
        let cols = columns("SELECT Email, email, EMAIL FROM users", &["users"]);
        assert_eq!(cols, vec!["Email".to_string()]);
    }

    #[test]
    fn test_malformed_sql_yields_nothing() {
        assert!(columns("SELECT 'unterminated FROM users", &[]).is_empty());
    }

    #[test]
    fn test_keywords_and_short_names_are_excluded() {
        let cols = columns(
            "SELECT COUNT(*) FROM t WHERE toYear(created_date) = toYear(now()) AND x > 1",
            &["t"],
        );
        assert_eq!(cols, vec!["created_date".to_string()]);
    }

    #[test]
    fn test_extraction_is_pure() {
        let known = tables(&["users"]);
        let sql = "SELECT id, name, email FROM users WHERE name LIKE 'a%'";
        assert_eq!(
            extract_candidate_columns(sql, &known),
            extract_candidate_columns(sql, &known)
        );
    }
}
