//! Environment-driven configuration.

use crate::dialect::Dialect;
use crate::error::{Result, Text2SqlError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_LLM_BASE_URL: &str = "https://dashscope-intl.aliyuncs.com/compatible-mode/v1";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: "qwen-turbo".to_string(),
            embedding_model: "text-embedding-v3".to_string(),
            max_tokens: 500,
            temperature: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection_prefix: String,
    pub dimension: usize,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key: None,
            collection_prefix: String::new(),
            dimension: 1024,
        }
    }
}

/// Connection settings for the analytic database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_port() -> u16 {
    8123
}

fn default_user() -> String {
    "default".to_string()
}

fn default_database() -> String {
    "default".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
            database: default_database(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ValidationConfig {
    pub relevance_threshold: f32,
    pub n_results: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.5,
            n_results: 10,
        }
    }
}

/// Per-call timeouts for external collaborators.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub embed: Duration,
    pub search: Duration,
    pub completion: Duration,
    pub execute: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            embed: Duration::from_millis(10_000),
            search: Duration::from_millis(10_000),
            completion: Duration::from_millis(60_000),
            execute: Duration::from_millis(60_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub dialect: Dialect,
    pub llm: LlmConfig,
    pub qdrant: QdrantConfig,
    pub database: DatabaseConfig,
    pub validation: ValidationConfig,
    pub timeouts: Timeouts,
    pub tenant_config_path: Option<PathBuf>,
    /// Replaces the built-in table snippet in generation prompts.
    pub table_context: Option<String>,
    pub bind_addr: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            llm: LlmConfig::default(),
            qdrant: QdrantConfig::default(),
            database: DatabaseConfig::default(),
            validation: ValidationConfig::default(),
            timeouts: Timeouts::default(),
            tenant_config_path: None,
            table_context: None,
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; unset variables take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = ServiceConfig::default();

        let dialect = match get("DATABASE_TYPE") {
            Some(key) => Dialect::from_str(&key)?,
            None => defaults.dialect,
        };

        let llm = LlmConfig {
            api_key: get("QWEN_API_KEY")
                .or_else(|| get("DASHSCOPE_API_KEY"))
                .or_else(|| get("OPENAI_API_KEY"))
                .unwrap_or_default(),
            base_url: get("QWEN_BASE_URL").unwrap_or(defaults.llm.base_url),
            model: get("QWEN_MODEL").unwrap_or(defaults.llm.model),
            embedding_model: get("EMBEDDING_MODEL").unwrap_or(defaults.llm.embedding_model),
            max_tokens: parse_or("LLM_MAX_TOKENS", get("LLM_MAX_TOKENS"), defaults.llm.max_tokens)?,
            temperature: parse_or(
                "LLM_TEMPERATURE",
                get("LLM_TEMPERATURE"),
                defaults.llm.temperature,
            )?,
        };

        let qdrant = QdrantConfig {
            url: get("QDRANT_URL").unwrap_or(defaults.qdrant.url),
            api_key: get("QDRANT_API_KEY"),
            collection_prefix: get("QDRANT_COLLECTION_PREFIX").unwrap_or_default(),
            dimension: parse_or(
                "EMBEDDING_DIMENSION",
                get("EMBEDDING_DIMENSION"),
                defaults.qdrant.dimension,
            )?,
        };

        let database = DatabaseConfig {
            host: get("CLICKHOUSE_HOST").unwrap_or(defaults.database.host),
            port: parse_or("CLICKHOUSE_PORT", get("CLICKHOUSE_PORT"), defaults.database.port)?,
            user: get("CLICKHOUSE_USER").unwrap_or(defaults.database.user),
            password: get("CLICKHOUSE_PASSWORD").unwrap_or_default(),
            database: get("CLICKHOUSE_DATABASE").unwrap_or(defaults.database.database),
        };

        let validation = ValidationConfig {
            relevance_threshold: parse_or(
                "RELEVANCE_THRESHOLD",
                get("RELEVANCE_THRESHOLD"),
                defaults.validation.relevance_threshold,
            )?,
            n_results: parse_or("N_RESULTS", get("N_RESULTS"), defaults.validation.n_results)?,
        };

        let timeouts = Timeouts {
            embed: millis_or("EMBED_TIMEOUT_MS", get("EMBED_TIMEOUT_MS"), defaults.timeouts.embed)?,
            search: millis_or(
                "SEARCH_TIMEOUT_MS",
                get("SEARCH_TIMEOUT_MS"),
                defaults.timeouts.search,
            )?,
            completion: millis_or(
                "COMPLETION_TIMEOUT_MS",
                get("COMPLETION_TIMEOUT_MS"),
                defaults.timeouts.completion,
            )?,
            execute: millis_or(
                "EXECUTE_TIMEOUT_MS",
                get("EXECUTE_TIMEOUT_MS"),
                defaults.timeouts.execute,
            )?,
        };

        Ok(Self {
            dialect,
            llm,
            qdrant,
            database,
            validation,
            timeouts,
            tenant_config_path: get("TENANT_CONFIG_PATH").map(PathBuf::from),
            table_context: get("TABLE_CONTEXT"),
            bind_addr: get("TEXT2SQL_BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| Text2SqlError::Config(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

fn millis_or(key: &str, value: Option<String>, default: Duration) -> Result<Duration> {
    let ms = parse_or(key, value, default.as_millis() as u64)?;
    Ok(Duration::from_millis(ms))
}

/// Read a tenant file: a JSON object of `tenant_id -> DatabaseConfig`.
pub fn load_tenants(path: &Path) -> Result<HashMap<String, DatabaseConfig>> {
    let raw = std::fs::read_to_string(path)?;
    let tenants: HashMap<String, DatabaseConfig> = serde_json::from_str(&raw).map_err(|e| {
        Text2SqlError::Config(format!("Invalid tenant file {}: {}", path.display(), e))
    })?;
    Ok(tenants)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.dialect, Dialect::ClickHouse);
        assert_eq!(config.llm.model, "qwen-turbo");
        assert_eq!(config.qdrant.url, "http://localhost:6333");
        assert_eq!(config.database.port, 8123);
        assert_eq!(config.validation.relevance_threshold, 0.5);
        assert_eq!(config.timeouts.completion, Duration::from_secs(60));
        assert_eq!(config.table_context, None);
    }

    #[test]
    fn test_overrides_and_key_fallback() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("DATABASE_TYPE", "mysql"),
            ("DASHSCOPE_API_KEY", "sk-test"),
            ("N_RESULTS", "3"),
            ("SEARCH_TIMEOUT_MS", "250"),
            ("TABLE_CONTEXT", "Table: sales.invoices (invoice_id, total)"),
        ]))
        .unwrap();
        assert_eq!(config.dialect, Dialect::MySql);
        assert_eq!(config.llm.api_key, "sk-test");
        assert_eq!(config.validation.n_results, 3);
        assert_eq!(config.timeouts.search, Duration::from_millis(250));
        assert_eq!(
            config.table_context.as_deref(),
            Some("Table: sales.invoices (invoice_id, total)")
        );
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = ServiceConfig::from_lookup(lookup(&[("CLICKHOUSE_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, Text2SqlError::Config(_)));

        let err = ServiceConfig::from_lookup(lookup(&[("DATABASE_TYPE", "oracle")])).unwrap_err();
        assert!(matches!(err, Text2SqlError::UnsupportedDialect(_)));
    }

    #[test]
    fn test_tenant_config_defaults() {
        let tenants: HashMap<String, DatabaseConfig> =
            serde_json::from_str(r#"{"acme": {"host": "ch.acme.internal", "database": "sales"}}"#)
                .unwrap();
        let acme = &tenants["acme"];
        assert_eq!(acme.port, 8123);
        assert_eq!(acme.user, "default");
        assert_eq!(acme.database, "sales");
    }
}
