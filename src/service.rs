//! Request orchestration.
//!
//! One request walks RECEIVED -> PRE_VALIDATING -> GENERATING ->
//! POST_VALIDATING -> READY and, for `ask`, on to EXECUTING -> DONE. Any stage
//! may end the request early with a rejection or a failure.

use crate::config::{Timeouts, ValidationConfig};
use crate::dialect::{DatabaseContext, Dialect};
use crate::error::{Result, Text2SqlError};
use crate::execution::{ColumnInfo, QueryResult, SqlExecutor};
use crate::llm::{CompletionProvider, EmbeddingProvider};
use crate::prompt::{build_prompt, extract_sql, is_select_statement};
use crate::recovery::{with_timeout, RetryPolicy};
use crate::retrieval::RetrievedContext;
use crate::schema_knowledge::SchemaKnowledge;
use crate::sql_scan::DialectLexer;
use crate::temporal::{detect_phrase, TemporalContract};
use crate::training::{NewTrainingRecord, TrainingItemResult, TrainingKind, TrainingRecord, TrainingRequest};
use crate::validation::{PostValidator, PreValidator, ValidationStage};
use crate::vector_store::{SimilaritySearch, TrainingStore};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn, Instrument};

/// Capability handles the service is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub search: Arc<dyn SimilaritySearch>,
    pub store: Arc<dyn TrainingStore>,
    pub llm: Arc<dyn CompletionProvider>,
    pub executor: Arc<dyn SqlExecutor>,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub validation: ValidationConfig,
    pub timeouts: Timeouts,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Received,
    PreValidating,
    Rejected,
    Generating,
    GenerationFailed,
    PostValidating,
    Ready,
    Executing,
    ExecutionFailed,
    Done,
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStage::Received => "RECEIVED",
            RequestStage::PreValidating => "PRE_VALIDATING",
            RequestStage::Rejected => "REJECTED",
            RequestStage::Generating => "GENERATING",
            RequestStage::GenerationFailed => "GENERATION_FAILED",
            RequestStage::PostValidating => "POST_VALIDATING",
            RequestStage::Ready => "READY",
            RequestStage::Executing => "EXECUTING",
            RequestStage::ExecutionFailed => "EXECUTION_FAILED",
            RequestStage::Done => "DONE",
        };
        write!(f, "{}", name)
    }
}

fn enter(stage: RequestStage) {
    debug!(stage = %stage, "request stage");
}

/// Outcome of SQL generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SqlGeneration {
    #[serde(rename = "ok")]
    Generated {
        sql: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    Rejected {
        stage: ValidationStage,
        reason: String,
    },
    Failed {
        error: String,
    },
}

impl SqlGeneration {
    pub fn sql(&self) -> Option<&str> {
        match self {
            SqlGeneration::Generated { sql, .. } => Some(sql),
            _ => None,
        }
    }
}

/// Response to `ask`: exactly one of `results` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<QueryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AskResponse {
    fn failed(sql: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            results: None,
            error: Some(error.into()),
        }
    }
}

pub struct Text2SqlService {
    collaborators: Collaborators,
    settings: ServiceSettings,
    dialect: RwLock<Dialect>,
    table_context: Option<String>,
    pre_validator: PreValidator,
    post_validators: HashMap<Dialect, PostValidator>,
}

impl Text2SqlService {
    pub fn new(collaborators: Collaborators, dialect: Dialect, settings: ServiceSettings) -> Result<Self> {
        let pre_validator = PreValidator::new(
            Arc::clone(&collaborators.embedder),
            Arc::clone(&collaborators.search),
            settings.validation,
            settings.timeouts,
        );
        let mut post_validators = HashMap::new();
        for d in Dialect::ALL {
            let knowledge = SchemaKnowledge::new(Arc::clone(&collaborators.store), d)?;
            post_validators.insert(
                d,
                PostValidator::new(Arc::new(knowledge), Arc::new(DialectLexer::new(d))),
            );
        }
        Ok(Self {
            collaborators,
            settings,
            dialect: RwLock::new(dialect),
            table_context: None,
            pre_validator,
            post_validators,
        })
    }

    /// Replace the built-in table context snippet in generation prompts.
    pub fn with_table_context(mut self, table_context: impl Into<String>) -> Self {
        self.table_context = Some(table_context.into());
        self
    }

    // ---- configuration ----

    pub fn database_type(&self) -> Dialect {
        self.dialect.read().map(|d| *d).unwrap_or_default()
    }

    /// Switch the default dialect. Only known dialect keys are accepted.
    pub fn set_database_type(&self, key: &str) -> Result<Dialect> {
        let dialect: Dialect = key.parse()?;
        let mut current = self
            .dialect
            .write()
            .map_err(|_| Text2SqlError::Config("dialect lock poisoned".to_string()))?;
        *current = dialect;
        info!("Database type set to {}", dialect);
        Ok(dialect)
    }

    pub fn database_context(&self, dialect: Dialect) -> DatabaseContext {
        let context = dialect.context();
        match &self.table_context {
            Some(tables) => context.with_table_context(tables.clone()),
            None => context,
        }
    }

    pub fn database_contexts(&self) -> Vec<DatabaseContext> {
        Dialect::ALL
            .iter()
            .map(|d| self.database_context(*d))
            .collect()
    }

    // ---- generation ----

    /// Pre-validate, generate and post-validate. Never executes.
    pub async fn generate_sql(&self, question: &str, dialect: Option<Dialect>) -> SqlGeneration {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("generate_sql", request_id = %request_id);
        self.generate_inner(question, dialect.unwrap_or_else(|| self.database_type()))
            .instrument(span)
            .await
    }

    async fn generate_inner(&self, question: &str, dialect: Dialect) -> SqlGeneration {
        enter(RequestStage::Received);

        enter(RequestStage::PreValidating);
        let screening = self.pre_validator.screen(question).await;
        if !screening.outcome.valid {
            enter(RequestStage::Rejected);
            info!("Question rejected: {}", screening.outcome.reason);
            return SqlGeneration::Rejected {
                stage: ValidationStage::PreValidation,
                reason: screening.outcome.reason,
            };
        }

        enter(RequestStage::Generating);
        let retrieved = screening.context.unwrap_or_default();
        let sql = match self.complete_sql(question, dialect, &retrieved).await {
            Ok(sql) => sql,
            Err(e) => {
                enter(RequestStage::GenerationFailed);
                warn!("SQL generation failed: {}", e);
                return SqlGeneration::Failed {
                    error: e.to_string(),
                };
            }
        };

        enter(RequestStage::PostValidating);
        let outcome = match self.post_validators.get(&dialect) {
            Some(validator) => validator.validate_sql(&sql).await,
            None => {
                return SqlGeneration::Failed {
                    error: Text2SqlError::UnsupportedDialect(dialect.to_string()).to_string(),
                }
            }
        };
        if !outcome.valid {
            enter(RequestStage::Rejected);
            info!("Generated SQL rejected: {}", outcome.reason);
            return SqlGeneration::Rejected {
                stage: ValidationStage::PostValidation,
                reason: outcome.reason,
            };
        }

        let warnings = self.review_temporal(question, dialect, &sql);
        enter(RequestStage::Ready);
        SqlGeneration::Generated { sql, warnings }
    }

    async fn complete_sql(
        &self,
        question: &str,
        dialect: Dialect,
        retrieved: &RetrievedContext,
    ) -> Result<String> {
        let contract = TemporalContract::for_dialect(dialect);
        let prompt = build_prompt(
            question,
            &self.database_context(dialect),
            &contract.render_rules(),
            retrieved,
        );
        let llm = &self.collaborators.llm;
        let limit = self.settings.timeouts.completion;
        let response = self
            .settings
            .retry
            .retry_with_backoff("completion", || {
                with_timeout("completion", limit, llm.complete(&prompt.system, &prompt.history))
            })
            .await?;
        Ok(extract_sql(&response))
    }

    fn review_temporal(&self, question: &str, dialect: Dialect, sql: &str) -> Vec<String> {
        let phrase = match detect_phrase(question) {
            Some(p) => p,
            None => return Vec::new(),
        };
        match TemporalContract::for_dialect(dialect).review(phrase, sql) {
            Ok(()) => Vec::new(),
            Err(violation) => {
                warn!("Temporal filter for '{}' looks wrong: {}", violation.phrase, violation.message);
                vec![violation.message]
            }
        }
    }

    /// Generate, validate and, for SELECT-class SQL, execute.
    pub async fn ask(&self, question: &str, dialect: Option<Dialect>) -> AskResponse {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("ask", request_id = %request_id);
        let dialect = dialect.unwrap_or_else(|| self.database_type());
        async {
            let sql = match self.generate_inner(question, dialect).await {
                SqlGeneration::Generated { sql, .. } => sql,
                SqlGeneration::Rejected { reason, .. } => return AskResponse::failed("", reason),
                SqlGeneration::Failed { error } => return AskResponse::failed("", error),
            };

            if sql.trim().is_empty() || !is_select_statement(&sql) {
                return AskResponse::failed(sql, "Only SELECT queries can be executed.");
            }

            enter(RequestStage::Executing);
            match self.execute(&sql).await {
                Ok(results) => {
                    enter(RequestStage::Done);
                    info!("Query returned {} rows", results.row_count);
                    AskResponse {
                        sql,
                        results: Some(results),
                        error: None,
                    }
                }
                Err(e) => {
                    enter(RequestStage::ExecutionFailed);
                    warn!("Query execution failed: {}", e);
                    AskResponse::failed(sql, e.to_string())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run SQL on the executor with timeout and retry.
    pub async fn execute(&self, sql: &str) -> Result<QueryResult> {
        if sql.trim().is_empty() {
            return Err(Text2SqlError::Input("SQL cannot be empty".to_string()));
        }
        let executor = &self.collaborators.executor;
        let limit = self.settings.timeouts.execute;
        self.settings
            .retry
            .retry_with_backoff("execute", || with_timeout("execute", limit, executor.execute(sql)))
            .await
    }

    pub async fn health_check(&self) -> bool {
        let limit = self.settings.timeouts.execute;
        matches!(
            with_timeout("health check", limit, self.collaborators.executor.health_check()).await,
            Ok(true)
        )
    }

    // ---- training ----

    async fn store_record(&self, record: NewTrainingRecord) -> Result<String> {
        let limit = self.settings.timeouts.embed + self.settings.timeouts.search;
        let kind = record.kind;
        let id = with_timeout("training write", limit, self.collaborators.store.add(record)).await?;
        debug!("Stored {} record {}", kind, id);
        Ok(id)
    }

    /// Validate the whole batch, then write record by record. A failure part
    /// way through leaves the records already written in place.
    pub async fn train(&self, request: TrainingRequest) -> Result<Vec<TrainingItemResult>> {
        let records = request.into_records()?;
        let mut results = Vec::with_capacity(records.len());
        let mut pair = 0;
        for record in records {
            let kind = record.kind;
            let id = self.store_record(record).await?;
            let pair_index = if kind == TrainingKind::QuestionSql {
                pair += 1;
                Some(pair - 1)
            } else {
                None
            };
            results.push(TrainingItemResult {
                kind,
                pair: pair_index,
                id,
            });
        }
        info!("Stored {} training records", results.len());
        Ok(results)
    }

    pub async fn train_ddl(&self, ddl: &str) -> Result<String> {
        if ddl.trim().is_empty() {
            return Err(Text2SqlError::Input("DDL cannot be empty".to_string()));
        }
        self.store_record(NewTrainingRecord::ddl(ddl)).await
    }

    pub async fn train_documentation(&self, documentation: &str) -> Result<String> {
        if documentation.trim().is_empty() {
            return Err(Text2SqlError::Input("Documentation cannot be empty".to_string()));
        }
        self.store_record(NewTrainingRecord::documentation(documentation))
            .await
    }

    pub async fn train_question_sql(&self, question: &str, sql: &str) -> Result<String> {
        if question.trim().is_empty() || sql.trim().is_empty() {
            return Err(Text2SqlError::Input(
                "Question and SQL cannot be empty".to_string(),
            ));
        }
        self.store_record(NewTrainingRecord::question_sql(question, sql))
            .await
    }

    /// Describe the live schema and store one documentation record per table.
    pub async fn train_from_information_schema(&self) -> Result<Vec<TrainingItemResult>> {
        let limit = self.settings.timeouts.execute;
        let columns = with_timeout(
            "describe schema",
            limit,
            self.collaborators.executor.describe_schema(),
        )
        .await?;

        let mut results = Vec::new();
        for doc in table_documentation(columns) {
            let id = self
                .store_record(NewTrainingRecord::documentation(doc))
                .await?;
            results.push(TrainingItemResult {
                kind: TrainingKind::Documentation,
                pair: None,
                id,
            });
        }
        info!("Trained {} tables from information schema", results.len());
        Ok(results)
    }

    pub async fn training_data(&self) -> Result<Vec<TrainingRecord>> {
        let limit = self.settings.timeouts.search;
        with_timeout("list training data", limit, self.collaborators.store.list()).await
    }

    pub async fn remove_training_data(&self, id: &str) -> Result<()> {
        let limit = self.settings.timeouts.search;
        let removed =
            with_timeout("remove training data", limit, self.collaborators.store.remove(id)).await?;
        if removed {
            info!("Removed training record {}", id);
            Ok(())
        } else {
            Err(Text2SqlError::NotFound(format!("training record {}", id)))
        }
    }
}

/// One markdown table description per `(schema, table)`, in name order.
fn table_documentation(columns: Vec<ColumnInfo>) -> Vec<String> {
    let sorted = columns
        .into_iter()
        .sorted_by(|a, b| (&a.table_schema, &a.table_name).cmp(&(&b.table_schema, &b.table_name)));
    let grouped = sorted.group_by(|c| (c.table_schema.clone(), c.table_name.clone()));

    let mut docs = Vec::new();
    for ((schema, table), group) in &grouped {
        let mut doc = format!(
            "The following columns are in the {} table in the {} database:\n\n\
             | column_name | data_type |\n| --- | --- |\n",
            table, schema
        );
        for column in group {
            doc.push_str(&format!("| {} | {} |\n", column.column_name, column.data_type));
        }
        docs.push(doc);
    }
    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(schema: &str, table: &str, name: &str, ty: &str) -> ColumnInfo {
        ColumnInfo {
            table_schema: schema.to_string(),
            table_name: table.to_string(),
            column_name: name.to_string(),
            data_type: ty.to_string(),
        }
    }

    #[test]
    fn test_table_documentation_groups_by_table() {
        let docs = table_documentation(vec![
            column("internal", "realtime_order", "created_date", "DateTime"),
            column("internal", "customers", "email", "String"),
            column("internal", "realtime_order", "grand_total", "Decimal(18, 2)"),
        ]);
        assert_eq!(docs.len(), 2);
        assert!(docs[0].contains("customers table in the internal database"));
        assert!(docs[1].contains("| created_date | DateTime |"));
        assert!(docs[1].contains("| grand_total | Decimal(18, 2) |"));
    }

    #[test]
    fn test_generation_serializes_with_kind_tag() {
        let ok = serde_json::to_value(SqlGeneration::Generated {
            sql: "SELECT 1".into(),
            warnings: Vec::new(),
        })
        .unwrap();
        assert_eq!(ok, serde_json::json!({"kind": "ok", "sql": "SELECT 1"}));

        let rejected = serde_json::to_value(SqlGeneration::Rejected {
            stage: ValidationStage::PreValidation,
            reason: "too short".into(),
        })
        .unwrap();
        assert_eq!(rejected["kind"], "rejected");
        assert_eq!(rejected["stage"], "pre_validation");

        let failed = serde_json::to_value(SqlGeneration::Failed {
            error: "timeout".into(),
        })
        .unwrap();
        assert_eq!(failed["kind"], "failed");
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(RequestStage::PreValidating.to_string(), "PRE_VALIDATING");
        assert_eq!(RequestStage::ExecutionFailed.to_string(), "EXECUTION_FAILED");
    }
}
