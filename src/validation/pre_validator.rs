//! Question relevance screening.
//!
//! A question is answerable when at least one training record in any
//! collection is similar enough to it. Embedding or search failures let the
//! question through.

use crate::config::{Timeouts, ValidationConfig};
use crate::error::Result;
use crate::llm::EmbeddingProvider;
use crate::recovery::with_timeout;
use crate::retrieval::{RetrievedContext, Retriever};
use crate::validation::ValidationOutcome;
use crate::vector_store::SimilaritySearch;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const MIN_QUESTION_CHARS: usize = 3;

/// Result of screening, with the context that was retrieved on the way.
///
/// `context` is `None` when validation was skipped or the input was rejected
/// before any search.
#[derive(Debug, Clone, PartialEq)]
pub struct Screening {
    pub outcome: ValidationOutcome,
    pub context: Option<RetrievedContext>,
}

pub struct PreValidator {
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
    threshold: f32,
    embed_timeout: Duration,
}

impl PreValidator {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        search: Arc<dyn SimilaritySearch>,
        validation: ValidationConfig,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            embedder,
            retriever: Retriever::new(search, validation.n_results, timeouts.search),
            threshold: validation.relevance_threshold,
            embed_timeout: timeouts.embed,
        }
    }

    /// Reject empty or too-short input without calling any collaborator.
    pub fn check_input(question: &str) -> Option<ValidationOutcome> {
        if question.trim().is_empty() {
            return Some(ValidationOutcome::reject("Question cannot be empty."));
        }
        let significant = question.chars().filter(|c| !c.is_whitespace()).count();
        if significant < MIN_QUESTION_CHARS {
            return Some(ValidationOutcome::reject(
                "Question is too short. Please provide a more detailed question.",
            ));
        }
        None
    }

    pub async fn validate_question(&self, question: &str) -> ValidationOutcome {
        self.screen(question).await.outcome
    }

    pub async fn screen(&self, question: &str) -> Screening {
        if let Some(outcome) = Self::check_input(question) {
            return Screening {
                outcome,
                context: None,
            };
        }

        match self.relevant_context(question).await {
            Ok(context) if context.is_empty() => {
                debug!("No training record above threshold {}", self.threshold);
                Screening {
                    outcome: ValidationOutcome::reject(
                        "Sorry, your question does not match any known database context. \
                         Please clarify or rephrase your question.",
                    ),
                    context: Some(context),
                }
            }
            Ok(context) => {
                debug!("Question matched {} training records", context.total());
                Screening {
                    outcome: ValidationOutcome::accept("Valid question"),
                    context: Some(context),
                }
            }
            Err(e) => {
                warn!("Pre-validation skipped, letting question through: {}", e);
                Screening {
                    outcome: ValidationOutcome::accept("Validation skipped due to error"),
                    context: None,
                }
            }
        }
    }

    async fn relevant_context(&self, question: &str) -> Result<RetrievedContext> {
        let embedding = with_timeout("embed", self.embed_timeout, self.embedder.embed(question)).await?;
        let context = self.retriever.retrieve(&embedding).await?;
        Ok(context.above(self.threshold))
    }
}
