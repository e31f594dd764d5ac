//! Qdrant REST adapter.
//!
//! One collection per training kind. Point ids are plain UUIDs; the record id
//! handed to callers is `<uuid><suffix>` so removal can find the collection.

use crate::config::QdrantConfig;
use crate::error::{Result, Text2SqlError};
use crate::llm::EmbeddingProvider;
use crate::training::{NewTrainingRecord, TrainingKind, TrainingRecord};
use crate::vector_store::{sort_hits, SearchHit, SimilaritySearch, TrainingStore};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

const SCROLL_PAGE: usize = 256;

pub struct QdrantStore {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    collection_prefix: String,
    dimension: usize,
    embedder: Arc<dyn EmbeddingProvider>,
    collections_ready: OnceCell<()>,
}

impl QdrantStore {
    pub fn new(config: &QdrantConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            collection_prefix: config.collection_prefix.clone(),
            dimension: config.dimension,
            embedder,
            collections_ready: OnceCell::new(),
        }
    }

    fn collection_name(&self, kind: TrainingKind) -> String {
        format!("{}{}", self.collection_prefix, kind.collection())
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Option<Value>> {
        let response = builder.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Text2SqlError::VectorStore(format!(
                "Qdrant error ({}): {}",
                status, error_text
            )));
        }
        let body: Value = response.json().await.map_err(|e| {
            Text2SqlError::VectorStore(format!("Failed to parse Qdrant response: {}", e))
        })?;
        Ok(Some(body))
    }

    /// Create missing collections once per store.
    pub async fn ensure_collections(&self) -> Result<()> {
        self.collections_ready
            .get_or_try_init(|| async {
                for kind in TrainingKind::ALL {
                    let name = self.collection_name(kind);
                    let path = format!("/collections/{}", name);
                    if self.send(self.request(reqwest::Method::GET, &path)).await?.is_some() {
                        continue;
                    }
                    info!("Creating Qdrant collection {}", name);
                    let body = json!({"vectors": {"size": self.dimension, "distance": "Cosine"}});
                    self.send(self.request(reqwest::Method::PUT, &path).json(&body))
                        .await?;
                }
                Ok::<(), Text2SqlError>(())
            })
            .await?;
        Ok(())
    }

    fn split_record_id(id: &str) -> Option<(TrainingKind, Uuid)> {
        let kind = TrainingKind::from_record_id(id)?;
        let point = id.strip_suffix(kind.id_suffix())?;
        let uuid = Uuid::parse_str(point).ok()?;
        Some((kind, uuid))
    }
}

fn payload_for(record: &NewTrainingRecord) -> Value {
    match record.kind {
        TrainingKind::QuestionSql => json!({
            "question": record.question.clone().unwrap_or_default(),
            "sql": record.content,
        }),
        TrainingKind::Ddl => json!({"ddl": record.content}),
        TrainingKind::Documentation => json!({"documentation": record.content}),
    }
}

fn malformed(what: &str) -> Text2SqlError {
    Text2SqlError::VectorStore(format!("Malformed Qdrant {}", what))
}

fn record_from_point(kind: TrainingKind, point: &Value) -> Result<TrainingRecord> {
    let point_id = match &point["id"] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(malformed("point: missing id")),
    };
    let payload = &point["payload"];
    let field = |name: &str| {
        payload[name]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| malformed(&format!("point {}: payload has no '{}'", point_id, name)))
    };
    let (content, question) = match kind {
        TrainingKind::QuestionSql => (field("sql")?, payload["question"].as_str().map(str::to_string)),
        TrainingKind::Ddl => (field("ddl")?, None),
        TrainingKind::Documentation => (field("documentation")?, None),
    };
    Ok(TrainingRecord {
        id: format!("{}{}", point_id, kind.id_suffix()),
        kind,
        content,
        question,
    })
}

/// Decode a `points/search` response. Any point that doesn't decode fails
/// the whole response.
fn hits_from_search(kind: TrainingKind, response: &Value) -> Result<Vec<SearchHit>> {
    let points = response["result"]
        .as_array()
        .ok_or_else(|| malformed("search response"))?;
    let mut hits = points
        .iter()
        .map(|point| {
            let score = point["score"]
                .as_f64()
                .ok_or_else(|| malformed("search response: point without score"))?;
            Ok(SearchHit {
                record: record_from_point(kind, point)?,
                score: score as f32,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    sort_hits(&mut hits);
    Ok(hits)
}

/// Decode one `points/scroll` page into its records and the next offset
/// (`Null` on the last page).
fn scroll_page(kind: TrainingKind, response: &Value) -> Result<(Vec<TrainingRecord>, Value)> {
    let points = response["result"]["points"]
        .as_array()
        .ok_or_else(|| malformed("scroll response"))?;
    let records = points
        .iter()
        .map(|p| record_from_point(kind, p))
        .collect::<Result<Vec<_>>>()?;
    Ok((records, response["result"]["next_page_offset"].clone()))
}

#[async_trait]
impl SimilaritySearch for QdrantStore {
    async fn search(
        &self,
        collection: TrainingKind,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.ensure_collections().await?;
        let path = format!("/collections/{}/points/search", self.collection_name(collection));
        let body = json!({"vector": query, "limit": limit, "with_payload": true});
        let response = self
            .send(self.request(reqwest::Method::POST, &path).json(&body))
            .await?
            .ok_or_else(|| {
                Text2SqlError::VectorStore(format!("collection {} missing", collection.collection()))
            })?;

        hits_from_search(collection, &response)
    }
}

#[async_trait]
impl TrainingStore for QdrantStore {
    async fn add(&self, record: NewTrainingRecord) -> Result<String> {
        self.ensure_collections().await?;
        let embedding = self.embedder.embed(record.embedding_text()).await?;
        let point_id = Uuid::new_v4();
        let path = format!(
            "/collections/{}/points?wait=true",
            self.collection_name(record.kind)
        );
        let body = json!({
            "points": [{
                "id": point_id.to_string(),
                "vector": embedding,
                "payload": payload_for(&record),
            }]
        });
        self.send(self.request(reqwest::Method::PUT, &path).json(&body))
            .await?;
        let id = format!("{}{}", point_id, record.kind.id_suffix());
        debug!("Stored {} record {}", record.kind, id);
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<TrainingRecord>> {
        self.ensure_collections().await?;
        let mut records = Vec::new();
        for kind in TrainingKind::ALL {
            let path = format!("/collections/{}/points/scroll", self.collection_name(kind));
            let mut offset = Value::Null;
            loop {
                let mut body = json!({
                    "limit": SCROLL_PAGE,
                    "with_payload": true,
                    "with_vector": false,
                });
                if !offset.is_null() {
                    body["offset"] = offset.clone();
                }
                let response = match self
                    .send(self.request(reqwest::Method::POST, &path).json(&body))
                    .await?
                {
                    Some(r) => r,
                    None => break,
                };
                let (page, next) = scroll_page(kind, &response)?;
                records.extend(page);
                offset = next;
                if offset.is_null() {
                    break;
                }
            }
        }
        Ok(records)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let (kind, point) = match Self::split_record_id(id) {
            Some(parts) => parts,
            None => return Ok(false),
        };
        self.ensure_collections().await?;
        let collection = self.collection_name(kind);

        let get_path = format!("/collections/{}/points/{}", collection, point);
        if self
            .send(self.request(reqwest::Method::GET, &get_path))
            .await?
            .is_none()
        {
            return Ok(false);
        }

        let delete_path = format!("/collections/{}/points/delete?wait=true", collection);
        let body = json!({"points": [point.to_string()]});
        self.send(self.request(reqwest::Method::POST, &delete_path).json(&body))
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_record_id() {
        let uuid = Uuid::new_v4();
        let (kind, parsed) = QdrantStore::split_record_id(&format!("{}-ddl", uuid)).unwrap();
        assert_eq!(kind, TrainingKind::Ddl);
        assert_eq!(parsed, uuid);
        assert!(QdrantStore::split_record_id("not-a-uuid-sql").is_none());
        assert!(QdrantStore::split_record_id(&uuid.to_string()).is_none());
    }

    #[test]
    fn test_record_from_point() {
        let point = json!({
            "id": "3f1b5a52-6d1e-4c57-9a0e-1b2c3d4e5f60",
            "payload": {"question": "how many users?", "sql": "SELECT count() FROM users"}
        });
        let record = record_from_point(TrainingKind::QuestionSql, &point).unwrap();
        assert_eq!(record.id, "3f1b5a52-6d1e-4c57-9a0e-1b2c3d4e5f60-sql");
        assert_eq!(record.question.as_deref(), Some("how many users?"));
        assert_eq!(record.content, "SELECT count() FROM users");
    }

    #[test]
    fn test_point_without_payload_field_is_an_error() {
        let point = json!({"id": "3f1b5a52-6d1e-4c57-9a0e-1b2c3d4e5f60", "payload": {}});
        assert!(matches!(
            record_from_point(TrainingKind::Ddl, &point),
            Err(Text2SqlError::VectorStore(_))
        ));
    }

    #[test]
    fn test_search_response_decoding() {
        let ok = json!({"result": [
            {"id": "a", "score": 0.4, "payload": {"ddl": "CREATE TABLE a (x Int32)"}},
            {"id": "b", "score": 0.9, "payload": {"ddl": "CREATE TABLE b (y Int32)"}}
        ]});
        let hits = hits_from_search(TrainingKind::Ddl, &ok).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.id, "b-ddl");

        let no_score = json!({"result": [{"id": "a", "payload": {"ddl": "CREATE TABLE a (x Int32)"}}]});
        assert!(hits_from_search(TrainingKind::Ddl, &no_score).is_err());
        assert!(hits_from_search(TrainingKind::Ddl, &json!({"status": "ok"})).is_err());
    }

    #[test]
    fn test_scroll_page_decoding() {
        let page = json!({"result": {
            "points": [{"id": 7, "payload": {"documentation": "orders are sales"}}],
            "next_page_offset": 8
        }});
        let (records, next) = scroll_page(TrainingKind::Documentation, &page).unwrap();
        assert_eq!(records[0].id, "7-doc");
        assert_eq!(next, json!(8));

        let missing_points = json!({"result": {"next_page_offset": null}});
        assert!(matches!(
            scroll_page(TrainingKind::Documentation, &missing_points),
            Err(Text2SqlError::VectorStore(_))
        ));
        let bad_point = json!({"result": {"points": [{"payload": {"documentation": "x"}}]}});
        assert!(scroll_page(TrainingKind::Documentation, &bad_point).is_err());
    }

    #[test]
    fn test_payload_shapes() {
        let payload = payload_for(&NewTrainingRecord::documentation("orders are sales"));
        assert_eq!(payload["documentation"], "orders are sales");
    }
}
