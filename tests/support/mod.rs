#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use text2sql::config::Timeouts;
use text2sql::error::{Result, Text2SqlError};
use text2sql::execution::{ColumnInfo, QueryResult, SqlExecutor};
use text2sql::llm::{ChatMessage, CompletionProvider};
use text2sql::recovery::RetryPolicy;
use text2sql::training::TrainingKind;
use text2sql::vector_store::{InMemoryVectorStore, SearchHit, SimilaritySearch};
use text2sql::{Collaborators, Dialect, ServiceSettings, Text2SqlService};

pub const DIMENSION: usize = 512;

pub const ORDERS_DDL: &str = "CREATE TABLE realtime_order (\n\
    created_date DateTime,\n\
    grand_total Decimal(18, 2),\n\
    company_name String,\n\
    order_status String\n\
) ENGINE = MergeTree ORDER BY created_date";

/// Completion provider that always answers with the same text.
pub struct ScriptedCompletion {
    response: String,
    calls: AtomicUsize,
    last_history: Mutex<Vec<ChatMessage>>,
    last_system_prompt: Mutex<String>,
}

impl ScriptedCompletion {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            calls: AtomicUsize::new(0),
            last_history: Mutex::new(Vec::new()),
            last_system_prompt: Mutex::new(String::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_history(&self) -> Vec<ChatMessage> {
        self.last_history.lock().unwrap().clone()
    }

    pub fn last_system_prompt(&self) -> String {
        self.last_system_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn complete(&self, system_prompt: &str, history: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_system_prompt.lock().unwrap() = system_prompt.to_string();
        *self.last_history.lock().unwrap() = history.to_vec();
        Ok(self.response.clone())
    }
}

/// Executor that records every statement and returns a fixed result.
pub struct RecordingExecutor {
    executed: Mutex<Vec<String>>,
    columns: Vec<ColumnInfo>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::with_columns(Vec::new())
    }

    pub fn with_columns(columns: Vec<ColumnInfo>) -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
            columns,
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlExecutor for RecordingExecutor {
    fn name(&self) -> &str {
        "recording"
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(QueryResult::new(
            vec!["total".to_string()],
            vec![vec![json!(42)]],
        ))
    }

    async fn describe_schema(&self) -> Result<Vec<ColumnInfo>> {
        Ok(self.columns.clone())
    }
}

pub struct FailingSearch;

#[async_trait]
impl SimilaritySearch for FailingSearch {
    async fn search(
        &self,
        _collection: TrainingKind,
        _query: &[f32],
        _limit: usize,
    ) -> Result<Vec<SearchHit>> {
        Err(Text2SqlError::VectorStore("connection refused".to_string()))
    }
}

pub fn column(table: &str, name: &str, ty: &str) -> ColumnInfo {
    ColumnInfo {
        table_schema: "internal".to_string(),
        table_name: table.to_string(),
        column_name: name.to_string(),
        data_type: ty.to_string(),
    }
}

pub fn fast_settings() -> ServiceSettings {
    ServiceSettings {
        timeouts: Timeouts {
            embed: Duration::from_secs(1),
            search: Duration::from_secs(1),
            completion: Duration::from_secs(1),
            execute: Duration::from_secs(1),
        },
        retry: RetryPolicy::none(),
        ..ServiceSettings::default()
    }
}

pub struct Harness {
    pub service: Text2SqlService,
    pub store: Arc<InMemoryVectorStore>,
    pub llm: Arc<ScriptedCompletion>,
    pub executor: Arc<RecordingExecutor>,
}

pub fn harness(llm_response: &str) -> Harness {
    harness_with(llm_response, RecordingExecutor::new(), None)
}

/// Service over an in-memory store with hashing embeddings. `search`
/// replaces the store for similarity search only.
pub fn harness_with(
    llm_response: &str,
    executor: RecordingExecutor,
    search: Option<Arc<dyn SimilaritySearch>>,
) -> Harness {
    let store = Arc::new(InMemoryVectorStore::with_hashing(DIMENSION));
    let llm = Arc::new(ScriptedCompletion::new(llm_response));
    let executor = Arc::new(executor);
    let collaborators = Collaborators {
        embedder: store.embedder(),
        search: search.unwrap_or_else(|| store.clone() as Arc<dyn SimilaritySearch>),
        store: store.clone(),
        llm: llm.clone(),
        executor: executor.clone(),
    };
    let service = Text2SqlService::new(collaborators, Dialect::ClickHouse, fast_settings())
        .expect("service builds");
    Harness {
        service,
        store,
        llm,
        executor,
    }
}
