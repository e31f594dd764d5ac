//! Language model capabilities: chat completion and text embedding.

pub mod client;
pub mod embedder;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::OpenAiCompatClient;
pub use embedder::{HashingEmbedder, OpenAiEmbedder};

/// Vector embedding (simple f32 vector)
pub type Embedding = Vec<f32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;
}

/// Chat completion. `history` excludes the system prompt.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, system_prompt: &str, history: &[ChatMessage]) -> Result<String>;
}
