//! Known schema inference from stored DDL.
//!
//! Tables and columns are recovered from `ddl` training records with two
//! regexes: one for `CREATE TABLE <name> (` and one for `<column> <TYPE>`,
//! where TYPE comes from the dialect's column type vocabulary. The result is
//! recomputed on every read from a single listing of the store.

use crate::dialect::Dialect;
use crate::error::{Result, Text2SqlError};
use crate::sql_scan::is_keyword;
use crate::training::{TrainingKind, TrainingRecord};
use crate::vector_store::TrainingStore;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tables (lowercase) and columns (original case) known from DDL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownSchema {
    pub tables: HashSet<String>,
    pub columns: HashSet<String>,
}

impl KnownSchema {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.columns.is_empty()
    }

    /// Lowercased column names for case-insensitive containment checks.
    pub fn columns_lowercase(&self) -> HashSet<String> {
        self.columns.iter().map(|c| c.to_lowercase()).collect()
    }
}

pub struct DdlParser {
    table_re: Regex,
    column_re: Regex,
}

impl DdlParser {
    pub fn new(type_vocabulary: &[&str]) -> Result<Self> {
        let table_re = Regex::new(
            r#"(?i)CREATE\s+(?:OR\s+REPLACE\s+)?(?:TEMPORARY\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?([^\s(]+)(?:\s+ON\s+CLUSTER\s+\S+)?\s*\("#,
        )
        .map_err(|e| Text2SqlError::Config(format!("invalid table pattern: {}", e)))?;

        let types = type_vocabulary
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let column_re = Regex::new(&format!(r#"(?i)[`"]?\b(\w+)\b[`"]?\s+(?:{})\b"#, types))
            .map_err(|e| Text2SqlError::Config(format!("invalid column pattern: {}", e)))?;

        Ok(Self {
            table_re,
            column_re,
        })
    }

    pub fn for_dialect(dialect: Dialect) -> Result<Self> {
        Self::new(dialect.column_type_vocabulary())
    }

    /// Parse every `CREATE TABLE` statement in `ddl` into `schema`.
    ///
    /// Statements that don't look like a table definition are skipped.
    pub fn parse_into(&self, ddl: &str, schema: &mut KnownSchema) {
        for statement in ddl.split(';').filter(|s| !s.trim().is_empty()) {
            let captures = match self.table_re.captures(statement) {
                Some(c) => c,
                None => {
                    debug!("Skipping unparseable DDL statement: {}", statement.trim());
                    continue;
                }
            };
            let (name, body_start) = match (captures.get(1), captures.get(0)) {
                (Some(name), Some(whole)) => (name.as_str(), whole.end()),
                _ => continue,
            };
            schema.tables.insert(normalize_table_name(name));

            for column in self.column_re.captures_iter(&statement[body_start..]) {
                if let Some(col) = column.get(1) {
                    let col = col.as_str();
                    if !is_keyword(col) && !is_column_attribute(col) {
                        schema.columns.insert(col.to_string());
                    }
                }
            }
        }
    }

    pub fn parse(&self, ddl: &str) -> KnownSchema {
        let mut schema = KnownSchema::default();
        self.parse_into(ddl, &mut schema);
        schema
    }

    pub fn parse_records(&self, records: &[TrainingRecord]) -> KnownSchema {
        let mut schema = KnownSchema::default();
        for record in records.iter().filter(|r| r.kind == TrainingKind::Ddl) {
            self.parse_into(&record.content, &mut schema);
        }
        schema
    }
}

/// Words that open a column attribute and can precede a type keyword,
/// as in MySQL's `VARCHAR(255) CHARACTER SET utf8mb4`.
fn is_column_attribute(word: &str) -> bool {
    ["CHARACTER", "CHARSET", "COLLATE", "CONSTRAINT"]
        .iter()
        .any(|w| w.eq_ignore_ascii_case(word))
}

fn normalize_table_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '`' | '"' | '[' | ']'))
        .collect::<String>()
        .to_lowercase()
}

/// Reads the training store and derives the known schema on demand.
pub struct SchemaKnowledge {
    store: Arc<dyn TrainingStore>,
    parser: DdlParser,
}

impl SchemaKnowledge {
    pub fn new(store: Arc<dyn TrainingStore>, dialect: Dialect) -> Result<Self> {
        Ok(Self {
            store,
            parser: DdlParser::for_dialect(dialect)?,
        })
    }

    /// Tables and columns from one consistent listing.
    ///
    /// A failing store yields an empty schema; the error is logged only.
    pub async fn snapshot(&self) -> KnownSchema {
        match self.store.list().await {
            Ok(records) => self.parser.parse_records(&records),
            Err(e) => {
                warn!("Could not read training data for schema extraction: {}", e);
                KnownSchema::default()
            }
        }
    }

    pub async fn known_tables(&self) -> HashSet<String> {
        self.snapshot().await.tables
    }

    pub async fn known_columns(&self) -> HashSet<String> {
        self.snapshot().await.columns
    }
}
