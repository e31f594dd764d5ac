//! Vector Store Abstraction
//!
//! Training records are stored per kind in separate collections and searched
//! by embedding similarity. Both contracts are implemented by the in-memory
//! store and the Qdrant adapter.

pub mod memory;
pub mod qdrant;

use crate::error::Result;
use crate::training::{NewTrainingRecord, TrainingKind, TrainingRecord};
use async_trait::async_trait;

pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantStore;

/// Search result from vector store
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record: TrainingRecord,
    pub score: f32,
}

#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Up to `limit` records of `collection`, best score first.
    async fn search(
        &self,
        collection: TrainingKind,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>>;
}

#[async_trait]
pub trait TrainingStore: Send + Sync {
    /// Store one record and return its id.
    async fn add(&self, record: NewTrainingRecord) -> Result<String>;

    async fn list(&self) -> Result<Vec<TrainingRecord>>;

    /// `Ok(false)` if no record has this id.
    async fn remove(&self, id: &str) -> Result<bool>;
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Best score first; ties keep insertion order.
pub(crate) fn sort_hits(hits: &mut Vec<SearchHit>) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 1.0);

        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_similarity_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
