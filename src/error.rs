use thiserror::Error;

#[derive(Error, Debug)]
pub enum Text2SqlError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Unsupported database type: {0}. Supported types: clickhouse, mysql, postgresql")]
    UnsupportedDialect(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Text2SqlError {
    /// Infrastructure failures worth retrying: timeouts and transport errors.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Text2SqlError::Timeout { .. } | Text2SqlError::Http(_))
    }
}

impl From<reqwest::Error> for Text2SqlError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Text2SqlError::Timeout {
                operation: "HTTP request".to_string(),
                after_ms: 0,
            }
        } else {
            Text2SqlError::Http(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Text2SqlError>;
