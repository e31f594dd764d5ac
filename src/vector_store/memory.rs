use crate::error::{Result, Text2SqlError};
use crate::llm::{Embedding, EmbeddingProvider, HashingEmbedder};
use crate::training::{NewTrainingRecord, TrainingKind, TrainingRecord};
use crate::vector_store::{cosine_similarity, sort_hits, SearchHit, SimilaritySearch, TrainingStore};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::warn;

struct StoredRecord {
    record: TrainingRecord,
    embedding: Embedding,
}

/// In-memory vector store with linear cosine search.
///
/// Records are embedded on insert with the store's embedder. Insertion order
/// is kept, so listing and tie-breaking are deterministic.
pub struct InMemoryVectorStore {
    embedder: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    records: RwLock<Vec<StoredRecord>>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, dimension: usize) -> Self {
        Self {
            embedder,
            dimension,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Store backed by the offline hashing embedder.
    pub fn with_hashing(dimension: usize) -> Self {
        Self::new(Arc::new(HashingEmbedder::new(dimension)), dimension)
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&self.embedder)
    }

    /// Store a record with a precomputed embedding.
    pub fn insert_embedded(&self, record: NewTrainingRecord, embedding: Embedding) -> Result<String> {
        if embedding.len() != self.dimension {
            return Err(Text2SqlError::VectorStore(format!(
                "Embedding dimension {} doesn't match store dimension {}",
                embedding.len(),
                self.dimension
            )));
        }
        let id = format!("{}{}", uuid::Uuid::new_v4(), record.kind.id_suffix());
        let mut records = self
            .records
            .write()
            .map_err(|_| Text2SqlError::VectorStore("vector store lock poisoned".to_string()))?;
        records.push(StoredRecord {
            record: record.into_record(id.clone()),
            embedding,
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SimilaritySearch for InMemoryVectorStore {
    async fn search(
        &self,
        collection: TrainingKind,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(Text2SqlError::VectorStore(format!(
                "Query embedding dimension {} doesn't match store dimension {}",
                query.len(),
                self.dimension
            )));
        }
        let records = self
            .records
            .read()
            .map_err(|_| Text2SqlError::VectorStore("vector store lock poisoned".to_string()))?;

        let mut hits: Vec<SearchHit> = records
            .iter()
            .filter(|stored| stored.record.kind == collection)
            .map(|stored| SearchHit {
                record: stored.record.clone(),
                score: cosine_similarity(query, &stored.embedding),
            })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }
}

#[async_trait]
impl TrainingStore for InMemoryVectorStore {
    async fn add(&self, record: NewTrainingRecord) -> Result<String> {
        let embedding = self.embedder.embed(record.embedding_text()).await?;
        self.insert_embedded(record, embedding)
    }

    async fn list(&self) -> Result<Vec<TrainingRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| Text2SqlError::VectorStore("vector store lock poisoned".to_string()))?;
        Ok(records.iter().map(|s| s.record.clone()).collect())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        if TrainingKind::from_record_id(id).is_none() {
            warn!("Refusing to remove record with unrecognized id {}", id);
            return Ok(false);
        }
        let mut records = self
            .records
            .write()
            .map_err(|_| Text2SqlError::VectorStore("vector store lock poisoned".to_string()))?;
        let before = records.len();
        records.retain(|s| s.record.id != id);
        Ok(records.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_list_remove() {
        let store = InMemoryVectorStore::with_hashing(32);
        let ddl_id = store
            .add(NewTrainingRecord::ddl("CREATE TABLE users (id UInt32)"))
            .await
            .unwrap();
        store
            .add(NewTrainingRecord::documentation("users are customers"))
            .await
            .unwrap();
        assert!(ddl_id.ends_with("-ddl"));
        assert_eq!(store.list().await.unwrap().len(), 2);

        assert!(store.remove(&ddl_id).await.unwrap());
        assert!(!store.remove(&ddl_id).await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_is_scoped_to_collection() {
        let store = InMemoryVectorStore::with_hashing(64);
        store
            .add(NewTrainingRecord::question_sql(
                "total sales per company",
                "SELECT company_name, sum(grand_total) FROM orders GROUP BY company_name",
            ))
            .await
            .unwrap();
        store
            .add(NewTrainingRecord::documentation("total sales per company"))
            .await
            .unwrap();

        let query = HashingEmbedder::new(64).embed_sync("total sales per company");
        let hits = store
            .search(TrainingKind::QuestionSql, &query, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.kind, TrainingKind::QuestionSql);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_search_rejects_wrong_dimension() {
        let store = InMemoryVectorStore::with_hashing(16);
        let result = store.search(TrainingKind::Ddl, &[1.0, 0.0], 5).await;
        assert!(matches!(result, Err(Text2SqlError::VectorStore(_))));
    }

    #[test]
    fn test_insert_embedded_checks_dimension() {
        let store = InMemoryVectorStore::with_hashing(4);
        assert!(store
            .insert_embedded(NewTrainingRecord::ddl("x"), vec![1.0, 0.0])
            .is_err());
        assert!(store
            .insert_embedded(NewTrainingRecord::ddl("x"), vec![1.0, 0.0, 0.0, 0.0])
            .is_ok());
        assert_eq!(store.len(), 1);
    }
}
