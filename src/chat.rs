//! Chat completion client for answer generation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::config::{ChatConfig, EmbeddingConfig};
use crate::openai::OpenAiClient;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Produces a reply for a list of messages.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// `POST /chat/completions` against an OpenAI-compatible API.
pub struct OpenAiChat {
    client: OpenAiClient,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    /// Uses `chat.base_url` when set, otherwise the embedding endpoint's
    /// base URL and retry settings.
    pub fn new(chat: &ChatConfig, embedding: &EmbeddingConfig) -> Result<Self> {
        let base_url = chat.base_url.as_deref().unwrap_or(&embedding.base_url);
        let client = OpenAiClient::from_env(base_url, embedding.timeout_secs, embedding.max_retries)?;
        Ok(Self {
            client,
            model: chat.model.clone(),
            temperature: chat.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });
        let json = self
            .client
            .post_json("chat/completions", &body)
            .await
            .context("Chat completion failed")?;
        parse_chat_response(&json)
    }
}

/// Extract `choices[0].message.content`, trimmed.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))?;
    Ok(content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "  Sweden.\n"}}]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "Sweden.");
    }

    #[test]
    fn test_parse_chat_response_missing_content() {
        let json = serde_json::json!({"choices": []});
        assert!(parse_chat_response(&json).is_err());
    }

    #[test]
    fn test_message_serialization() {
        let msg = ChatMessage::system("be brief");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({"role": "system", "content": "be brief"})
        );
    }
}
