//! SQL dialects and their fixed database contexts.
//!
//! A dialect owns everything that differs between target databases: the
//! generation prompt, the table context snippet, the DDL column-type
//! vocabulary used for schema inference, the tokenizer dialect and the
//! temporal function vocabulary (see `temporal`).

use crate::error::{Result, Text2SqlError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported target dialects. Only these keys can be selected at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    ClickHouse,
    MySql,
    PostgreSql,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::ClickHouse, Dialect::MySql, Dialect::PostgreSql];

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::ClickHouse => "clickhouse",
            Dialect::MySql => "mysql",
            Dialect::PostgreSql => "postgresql",
        }
    }

    /// Column type keywords recognized after a column name in `CREATE TABLE`.
    pub fn column_type_vocabulary(&self) -> &'static [&'static str] {
        match self {
            Dialect::ClickHouse => &[
                "UInt8", "UInt16", "UInt32", "UInt64", "UInt128", "UInt256",
                "Int8", "Int16", "Int32", "Int64", "Int128", "Int256",
                "Float32", "Float64", "Decimal", "Decimal32", "Decimal64", "Decimal128",
                "String", "FixedString", "UUID", "Date", "Date32", "DateTime", "DateTime64",
                "Bool", "Boolean", "Enum8", "Enum16", "Array", "Map", "Tuple",
                "Nullable", "LowCardinality", "IPv4", "IPv6", "JSON",
            ],
            Dialect::MySql => &[
                "TINYINT", "SMALLINT", "MEDIUMINT", "INT", "INTEGER", "BIGINT",
                "DECIMAL", "NUMERIC", "FLOAT", "DOUBLE", "BIT", "BOOL", "BOOLEAN",
                "CHAR", "VARCHAR", "TINYTEXT", "TEXT", "MEDIUMTEXT", "LONGTEXT",
                "BINARY", "VARBINARY", "BLOB", "LONGBLOB", "ENUM", "SET", "JSON",
                "DATE", "DATETIME", "TIMESTAMP", "TIME", "YEAR",
            ],
            Dialect::PostgreSql => &[
                "SMALLINT", "INTEGER", "INT", "BIGINT", "SERIAL", "BIGSERIAL",
                "DECIMAL", "NUMERIC", "REAL", "DOUBLE", "MONEY", "BOOLEAN", "BOOL",
                "CHAR", "CHARACTER", "VARCHAR", "TEXT", "BYTEA", "UUID", "JSON", "JSONB",
                "DATE", "TIMESTAMP", "TIMESTAMPTZ", "TIME", "INTERVAL", "INET",
            ],
        }
    }

    /// Tokenizer dialect used by the identifier classifier.
    pub fn tokenizer_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect + Send + Sync> {
        match self {
            Dialect::ClickHouse => Box::new(sqlparser::dialect::ClickHouseDialect {}),
            Dialect::MySql => Box::new(sqlparser::dialect::MySqlDialect {}),
            Dialect::PostgreSql => Box::new(sqlparser::dialect::PostgreSqlDialect {}),
        }
    }

    pub fn context(&self) -> DatabaseContext {
        DatabaseContext::for_dialect(*self)
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect::ClickHouse
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Dialect {
    type Err = Text2SqlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "clickhouse" => Ok(Dialect::ClickHouse),
            "mysql" => Ok(Dialect::MySql),
            "postgresql" | "postgres" => Ok(Dialect::PostgreSql),
            other => Err(Text2SqlError::UnsupportedDialect(other.to_string())),
        }
    }
}

/// Fixed per-dialect generation context.
///
/// `system_prompt_template` contains a `{temporal_rules}` placeholder that is
/// filled with the dialect's rendered temporal contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseContext {
    pub dialect_name: String,
    pub system_prompt_template: String,
    pub table_context: String,
}

impl DatabaseContext {
    pub fn for_dialect(dialect: Dialect) -> Self {
        let (system_prompt_template, table_context) = match dialect {
            Dialect::ClickHouse => (CLICKHOUSE_PROMPT, CLICKHOUSE_TABLE_CONTEXT),
            Dialect::MySql => (MYSQL_PROMPT, ""),
            Dialect::PostgreSql => (POSTGRESQL_PROMPT, ""),
        };
        Self {
            dialect_name: dialect.name().to_string(),
            system_prompt_template: system_prompt_template.to_string(),
            table_context: table_context.to_string(),
        }
    }

    /// Replace the table context snippet (deployment-specific tables).
    pub fn with_table_context(mut self, table_context: impl Into<String>) -> Self {
        self.table_context = table_context.into();
        self
    }

    /// Full system prompt: template with temporal rules, then table context.
    pub fn system_prompt(&self, temporal_rules: &str) -> String {
        let prompt = self
            .system_prompt_template
            .replace("{temporal_rules}", temporal_rules);
        format!("{}\n\n{}", prompt, self.table_context).trim().to_string()
    }
}

const CLICKHOUSE_PROMPT: &str = r#"You are a ClickHouse SQL expert. Generate ONLY valid ClickHouse SQL queries.

RULES:
1. Use only table and column names that appear in the provided context.
2. Use ClickHouse functions: toYear(), toMonth(), toStartOfWeek(), toStartOfMonth(), toStartOfYear(), now(), today().
3. Never use year(), month() or invented table names.

Calendar periods are NOT rolling windows:
- "minggu lalu" / "last week" is the exact previous calendar week, not the past 7 days.
- "bulan lalu" / "last month" is the exact previous calendar month, not the past 30 days.
- "tahun lalu" / "last year" is the exact previous calendar year, not the past 365 days.

{temporal_rules}

Return ONLY the SQL query, no explanations."#;

const CLICKHOUSE_TABLE_CONTEXT: &str = r#"Available table: internal.realtime_order
Main columns: created_date (DateTime), grand_total (Numeric), company_name (String)"#;

const MYSQL_PROMPT: &str = r#"You are a MySQL SQL expert. Generate ONLY valid MySQL SQL queries.
Use MySQL functions: YEAR(), MONTH(), DATE_SUB(), CURDATE(), NOW().
Use backticks for identifiers when needed: `table`, `column`.

{temporal_rules}

Return ONLY the SQL query."#;

const POSTGRESQL_PROMPT: &str = r#"You are a PostgreSQL SQL expert. Generate ONLY valid PostgreSQL SQL queries.
Use PostgreSQL functions: EXTRACT(), DATE_TRUNC(), CURRENT_DATE, NOW().
Use double quotes for identifiers when needed.

{temporal_rules}

Return ONLY the SQL query."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dialect_keys() {
        assert_eq!("ClickHouse".parse::<Dialect>().unwrap(), Dialect::ClickHouse);
        assert_eq!("postgres".parse::<Dialect>().unwrap(), Dialect::PostgreSql);
        assert!(matches!(
            "oracle".parse::<Dialect>(),
            Err(Text2SqlError::UnsupportedDialect(_))
        ));
    }

    #[test]
    fn test_system_prompt_fills_temporal_rules() {
        let ctx = Dialect::MySql.context();
        let prompt = ctx.system_prompt("RULES HERE");
        assert!(prompt.contains("RULES HERE"));
        assert!(!prompt.contains("{temporal_rules}"));
    }
}
