//! JSON request routing, independent of the transport.
//!
//! The server binary parses raw HTTP and hands method, path and body here.

use crate::config::DatabaseConfig;
use crate::dialect::Dialect;
use crate::error::{Result, Text2SqlError};
use crate::registry::ServiceRegistry;
use crate::service::Text2SqlService;
use crate::training::TrainingRequest;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({"error": message.into()}),
        }
    }

    pub fn from_error(e: &Text2SqlError) -> Self {
        let status = match e {
            Text2SqlError::Input(_) | Text2SqlError::UnsupportedDialect(_) | Text2SqlError::Json(_) => 400,
            Text2SqlError::NotFound(_) => 404,
            Text2SqlError::Timeout { .. } => 504,
            _ => 500,
        };
        if status == 500 {
            error!("Request failed: {}", e);
        }
        Self::error(status, e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct QuestionBody {
    question: String,
    #[serde(default)]
    dialect: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecuteBody {
    sql: String,
}

#[derive(Debug, Default, Deserialize)]
struct TenantField {
    #[serde(default)]
    tenant_id: Option<String>,
}

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<ServiceRegistry>,
}

impl ApiState {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    let raw = if body.trim().is_empty() { "{}" } else { body };
    serde_json::from_str(raw).map_err(|e| Text2SqlError::Input(format!("Invalid request body: {}", e)))
}

/// Tenant from `?tenant_id=` or the JSON body.
fn tenant_of(query: Option<&str>, body: &str) -> Option<String> {
    let from_query = query.and_then(|q| {
        q.split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == "tenant_id")
            .map(|(_, v)| v.to_string())
    });
    from_query.or_else(|| {
        serde_json::from_str::<TenantField>(body)
            .ok()
            .and_then(|t| t.tenant_id)
    })
}

fn parse_dialect(key: Option<&str>) -> Result<Option<Dialect>> {
    key.map(str::parse::<Dialect>).transpose()
}

pub async fn route(state: &ApiState, method: &str, target: &str, body: &str) -> ApiResponse {
    match dispatch(state, method, target, body).await {
        Ok(response) => response,
        Err(e) => ApiResponse::from_error(&e),
    }
}

async fn dispatch(state: &ApiState, method: &str, target: &str, body: &str) -> Result<ApiResponse> {
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (target, None),
    };
    let segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    debug!("{} /{}", method, segments.join("/"));

    let tenant = tenant_of(query, body);
    let service = || -> Result<Arc<Text2SqlService>> { state.registry.get_service(tenant.as_deref()) };

    let response = match (method, segments.as_slice()) {
        ("GET", ["health"]) => {
            let healthy = service()?.health_check().await;
            let status = if healthy { "healthy" } else { "degraded" };
            ApiResponse::ok(json!({
                "status": status,
                "database": healthy,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }))
        }
        ("POST", ["ask"]) => {
            let req: QuestionBody = parse_body(body)?;
            let dialect = parse_dialect(req.dialect.as_deref())?;
            let answer = service()?.ask(&req.question, dialect).await;
            ApiResponse::ok(serde_json::to_value(answer)?)
        }
        ("POST", ["sql"]) => {
            let req: QuestionBody = parse_body(body)?;
            let dialect = parse_dialect(req.dialect.as_deref())?;
            let generation = service()?.generate_sql(&req.question, dialect).await;
            ApiResponse::ok(serde_json::to_value(generation)?)
        }
        ("POST", ["execute"]) => {
            let req: ExecuteBody = parse_body(body)?;
            let result = service()?.execute(&req.sql).await?;
            ApiResponse::ok(serde_json::to_value(result)?)
        }
        ("POST", ["train"]) => {
            let req: TrainingRequest = parse_body(body)?;
            let results = service()?.train(req).await?;
            ApiResponse::ok(json!({"results": results}))
        }
        ("POST", ["train", "schema"]) => {
            let results = service()?.train_from_information_schema().await?;
            ApiResponse::ok(json!({"results": results}))
        }
        ("GET", ["training-data"]) => {
            let records = service()?.training_data().await?;
            ApiResponse::ok(json!({"count": records.len(), "training_data": records}))
        }
        ("DELETE", ["training-data", id]) => {
            service()?.remove_training_data(id).await?;
            ApiResponse::ok(json!({"removed": id}))
        }
        ("GET", ["config", "database-type"]) => {
            ApiResponse::ok(json!({"database_type": service()?.database_type()}))
        }
        ("PUT", ["config", "database-type", key]) => {
            let dialect = service()?.set_database_type(key)?;
            ApiResponse::ok(json!({"database_type": dialect}))
        }
        ("POST", ["config", "database"]) => {
            let config: DatabaseConfig = parse_body(body)?;
            match tenant.as_deref() {
                Some(id) => state.registry.register_tenant(id, config),
                None => {
                    state.registry.replace_default(&config)?;
                }
            }
            ApiResponse::ok(json!({
                "status": "success",
                "message": "Database configuration updated",
            }))
        }
        ("GET", ["config", "database-contexts"]) => {
            ApiResponse::ok(json!({"contexts": service()?.database_contexts()}))
        }
        ("GET", ["tenants"]) => ApiResponse::ok(serde_json::to_value(state.registry.stats())?),
        ("POST", ["tenants", id, "register"]) => {
            let config: DatabaseConfig = parse_body(body)?;
            state.registry.register_tenant(id, config);
            ApiResponse::ok(json!({"registered": id}))
        }
        ("DELETE", ["tenants", id]) => {
            if !state.registry.remove_tenant(id) {
                return Err(Text2SqlError::NotFound(format!("tenant {}", id)));
            }
            ApiResponse::ok(json!({"removed": id}))
        }
        _ => ApiResponse::error(404, format!("No route for {} {}", method, path)),
    };
    Ok(response)
}
