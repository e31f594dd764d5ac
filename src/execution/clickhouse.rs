//! ClickHouse HTTP interface executor.

use crate::config::DatabaseConfig;
use crate::error::{Result, Text2SqlError};
use crate::execution::{ColumnInfo, QueryResult, SqlExecutor};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct JsonCompactResponse {
    #[serde(default)]
    meta: Vec<JsonCompactColumn>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct JsonCompactColumn {
    name: String,
    #[serde(rename = "type")]
    #[allow(dead_code)]
    column_type: String,
}

pub struct ClickHouseExecutor {
    client: reqwest::Client,
    endpoint: String,
    database: String,
    user: String,
    password: String,
}

impl ClickHouseExecutor {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("http://{}:{}/", config.host, config.port),
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        }
    }

    async fn query(&self, sql: &str) -> Result<JsonCompactResponse> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("database", self.database.as_str()),
                ("default_format", "JSONCompact"),
            ])
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .body(sql.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Text2SqlError::Execution(format!(
                "ClickHouse query failed with status {}: {}",
                status,
                text.trim()
            )));
        }

        let text = response.text().await?;
        parse_json_compact(&text)
    }
}

fn parse_json_compact(body: &str) -> Result<JsonCompactResponse> {
    if body.trim().is_empty() {
        return Ok(JsonCompactResponse {
            meta: Vec::new(),
            data: Vec::new(),
        });
    }
    serde_json::from_str(body).map_err(|e| {
        Text2SqlError::Execution(format!("Failed to parse ClickHouse response: {}", e))
    })
}

#[async_trait]
impl SqlExecutor for ClickHouseExecutor {
    fn name(&self) -> &str {
        "clickhouse"
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let sql = sql.trim().trim_end_matches(';');
        debug!("Executing on ClickHouse: {}", sql);
        let response = self.query(sql).await?;
        let columns = response.meta.into_iter().map(|c| c.name).collect();
        Ok(QueryResult::new(columns, response.data))
    }

    async fn describe_schema(&self) -> Result<Vec<ColumnInfo>> {
        let sql = format!(
            "SELECT table_schema, table_name, column_name, data_type \
             FROM information_schema.columns WHERE table_schema = '{}' \
             ORDER BY table_name, ordinal_position",
            self.database.replace('\'', "''")
        );
        let response = self.query(&sql).await?;
        Ok(response
            .data
            .into_iter()
            .filter_map(|row| {
                let cell = |i: usize| row.get(i).and_then(|v| v.as_str()).map(str::to_string);
                Some(ColumnInfo {
                    table_schema: cell(0)?,
                    table_name: cell(1)?,
                    column_name: cell(2)?,
                    data_type: cell(3)?,
                })
            })
            .collect())
    }
}
