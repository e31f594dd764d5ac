//! Generated SQL screening before execution.

use crate::schema_knowledge::{KnownSchema, SchemaKnowledge};
use crate::sql_scan::{classify_tokens, ScanError, SqlLexer};
use crate::validation::ValidationOutcome;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lowercase substrings that are never allowed in generated SQL.
pub const DESTRUCTIVE_PATTERNS: [&str; 5] = [
    "drop table",
    "delete from",
    "truncate",
    "alter table",
    "create table",
];

const SUGGESTION_THRESHOLD: f64 = 0.85;

pub struct PostValidator {
    schema: Arc<SchemaKnowledge>,
    lexer: Arc<dyn SqlLexer>,
}

impl PostValidator {
    pub fn new(schema: Arc<SchemaKnowledge>, lexer: Arc<dyn SqlLexer>) -> Self {
        Self { schema, lexer }
    }

    pub async fn validate_sql(&self, sql: &str) -> ValidationOutcome {
        if let Some(outcome) = precheck(sql) {
            return outcome;
        }
        let schema = self.schema.snapshot().await;
        self.validate_against(sql, &schema)
    }

    /// Validate against an already loaded schema.
    pub fn validate_against(&self, sql: &str, schema: &KnownSchema) -> ValidationOutcome {
        if let Some(outcome) = precheck(sql) {
            return outcome;
        }

        let tokens = match self.lexer.tokenize(sql) {
            Ok(tokens) if tokens.iter().any(|t| !t.is_whitespace()) => tokens,
            Ok(_) | Err(ScanError::Malformed(_)) => {
                return ValidationOutcome::reject("Generated SQL could not be parsed.")
            }
            Err(ScanError::Internal(e)) => {
                warn!("SQL validation skipped, scanner failed: {}", e);
                return ValidationOutcome::accept("SQL validation skipped");
            }
        };

        if schema.columns.is_empty() {
            debug!("No known columns, skipping column check");
            return ValidationOutcome::accept("SQL validation passed");
        }

        let known = schema.columns_lowercase();
        let unknown: Vec<String> = classify_tokens(&tokens, &schema.tables)
            .into_iter()
            .filter(|c| !known.contains(&c.to_lowercase()))
            .collect();
        if unknown.is_empty() {
            return ValidationOutcome::accept("SQL validation passed");
        }

        let mut reason = format!(
            "Generated SQL references unknown columns: {}. Please rephrase your question.",
            unknown.join(", ")
        );
        let hints: Vec<String> = unknown
            .iter()
            .filter_map(|c| closest_column(c, &schema.columns).map(|s| format!("{} -> {}", c, s)))
            .collect();
        if !hints.is_empty() {
            reason.push_str(&format!(" Did you mean: {}?", hints.join(", ")));
        }
        ValidationOutcome::reject(reason)
    }
}

/// Checks that need neither the schema nor the scanner.
fn precheck(sql: &str) -> Option<ValidationOutcome> {
    if sql.trim().is_empty() {
        return Some(ValidationOutcome::reject("No SQL was generated."));
    }
    let lowered = sql.to_lowercase();
    DESTRUCTIVE_PATTERNS
        .iter()
        .find(|p| lowered.contains(*p))
        .map(|p| {
            ValidationOutcome::reject(format!(
                "Generated SQL contains potentially harmful operation: {}",
                p
            ))
        })
}

fn closest_column<'a>(name: &str, known: &'a std::collections::HashSet<String>) -> Option<&'a str> {
    let lower = name.to_lowercase();
    known
        .iter()
        .map(|k| (k, strsim::jaro_winkler(&lower, &k.to_lowercase())))
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(k, _)| k.as_str())
}
