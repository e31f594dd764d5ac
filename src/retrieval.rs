//! Context retrieval across the three training collections.

use crate::error::Result;
use crate::recovery::with_timeout;
use crate::training::TrainingKind;
use crate::vector_store::{SearchHit, SimilaritySearch};
use std::sync::Arc;
use std::time::Duration;

/// Hits per collection, best first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedContext {
    pub question_sql: Vec<SearchHit>,
    pub ddl: Vec<SearchHit>,
    pub documentation: Vec<SearchHit>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.question_sql.is_empty() && self.ddl.is_empty() && self.documentation.is_empty()
    }

    pub fn total(&self) -> usize {
        self.question_sql.len() + self.ddl.len() + self.documentation.len()
    }

    /// Keep only hits scoring at least `threshold`.
    pub fn above(self, threshold: f32) -> Self {
        let keep = |hits: Vec<SearchHit>| -> Vec<SearchHit> {
            hits.into_iter().filter(|h| h.score >= threshold).collect()
        };
        Self {
            question_sql: keep(self.question_sql),
            ddl: keep(self.ddl),
            documentation: keep(self.documentation),
        }
    }
}

pub struct Retriever {
    search: Arc<dyn SimilaritySearch>,
    n_results: usize,
    timeout: Duration,
}

impl Retriever {
    pub fn new(search: Arc<dyn SimilaritySearch>, n_results: usize, timeout: Duration) -> Self {
        Self {
            search,
            n_results,
            timeout,
        }
    }

    async fn search_one(&self, kind: TrainingKind, query: &[f32]) -> Result<Vec<SearchHit>> {
        let operation = format!("{} search", kind.collection());
        with_timeout(
            &operation,
            self.timeout,
            self.search.search(kind, query, self.n_results),
        )
        .await
    }

    /// Search all three collections concurrently. Any failure fails the whole
    /// retrieval; results are merged in a fixed order.
    pub async fn retrieve(&self, query: &[f32]) -> Result<RetrievedContext> {
        let (question_sql, ddl, documentation) = tokio::join!(
            self.search_one(TrainingKind::QuestionSql, query),
            self.search_one(TrainingKind::Ddl, query),
            self.search_one(TrainingKind::Documentation, query),
        );
        Ok(RetrievedContext {
            question_sql: question_sql?,
            ddl: ddl?,
            documentation: documentation?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HashingEmbedder;
    use crate::training::NewTrainingRecord;
    use crate::vector_store::{InMemoryVectorStore, TrainingStore};

    #[tokio::test]
    async fn test_retrieve_and_filter() {
        let store = Arc::new(InMemoryVectorStore::with_hashing(512));
        store
            .add(NewTrainingRecord::ddl(
                "CREATE TABLE orders (company_name String, grand_total Float64)",
            ))
            .await
            .unwrap();
        store
            .add(NewTrainingRecord::documentation("weather data lives elsewhere"))
            .await
            .unwrap();

        let retriever = Retriever::new(store, 5, Duration::from_secs(1));
        let query = HashingEmbedder::new(512).embed_sync("grand_total per company_name from orders");
        let context = retriever.retrieve(&query).await.unwrap();
        assert_eq!(context.ddl.len(), 1);
        assert_eq!(context.documentation.len(), 1);

        let filtered = context.above(0.3);
        assert_eq!(filtered.ddl.len(), 1);
        assert!(filtered.documentation.is_empty());
        assert_eq!(filtered.total(), 1);
    }
}
