use crate::config::LlmConfig;
use crate::error::{Result, Text2SqlError};
use crate::llm::{ChatMessage, CompletionProvider};
use async_trait::async_trait;
use tracing::debug;

/// Chat completion over an OpenAI-compatible `/chat/completions` endpoint.
///
/// Defaults target DashScope's compatible mode with `qwen-turbo`.
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiCompatClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn request_body(&self, system_prompt: &str, history: &[ChatMessage]) -> serde_json::Value {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(serde_json::json!({"role": "system", "content": system_prompt}));
        for message in history {
            messages.push(serde_json::json!({"role": message.role, "content": message.content}));
        }
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatClient {
    async fn complete(&self, system_prompt: &str, history: &[ChatMessage]) -> Result<String> {
        let body = self.request_body(system_prompt, history);
        debug!("Calling {} with {} messages", self.model, history.len() + 1);

        let response = self
            .http
            .post(&format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Text2SqlError::Llm(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Text2SqlError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let choice = response_json["choices"]
            .get(0)
            .ok_or_else(|| Text2SqlError::Llm("No choices in LLM response".to_string()))?;

        Ok(choice["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_puts_system_first() {
        let client = OpenAiCompatClient::new(&LlmConfig::default());
        let body = client.request_body(
            "be precise",
            &[ChatMessage::user("q1"), ChatMessage::assistant("SELECT 1")],
        );
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(body["model"], "qwen-turbo");
        assert_eq!(body["max_tokens"], 500);
    }
}
