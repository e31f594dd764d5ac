//! Tabular query execution.

pub mod clickhouse;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use clickhouse::ClickHouseExecutor;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
        }
    }
}

/// One row of `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub table_schema: String,
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
}

/// Executes SQL against the analytic database.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, sql: &str) -> Result<QueryResult>;

    async fn describe_schema(&self) -> Result<Vec<ColumnInfo>>;

    async fn health_check(&self) -> Result<bool> {
        Ok(self.execute("SELECT 1").await.is_ok())
    }
}
