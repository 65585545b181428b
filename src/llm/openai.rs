//! OpenAI API client for chat completions, vision OCR and embeddings.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{snippet, Embedder, LlmProvider, ProviderKind};
use crate::config::OpenAiSettings;

const OCR_MAX_TOKENS: u32 = 1024;

/// OpenAI client.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl OpenAiClient {
    pub fn new(client: Client, settings: &OpenAiSettings) -> Self {
        Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            embedding_model: settings.embedding_model.clone(),
        }
    }

    /// Send a chat completion request and return the first choice's content.
    pub async fn chat(&self, model: &str, messages: Vec<Message>, max_tokens: u32) -> Result<String> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            max_tokens: Some(max_tokens),
        };

        debug!("Sending request to OpenAI: model={}", request.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to OpenAI")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, snippet(&error_text, 500));
        }

        let response: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        if let Some(usage) = &response.usage {
            info!(
                "OpenAI response: {} tokens (prompt: {}, completion: {})",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn transcribe(&self, png: &[u8], prompt: &str, model: Option<&str>) -> Result<String> {
        let model = model.unwrap_or(&self.model);
        info!("OpenAI OCR: {} byte image, model={}", png.len(), model);
        self.chat(model, vec![Message::user_with_image(prompt, png)], OCR_MAX_TOKENS)
            .await
    }

    async fn complete(&self, prompt: &str, model: Option<&str>, max_tokens: u32) -> Result<String> {
        let model = model.unwrap_or(&self.model);
        self.chat(model, vec![Message::user(prompt)], max_tokens).await
    }
}

#[async_trait::async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, text: &str, model: Option<&str>) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: model.unwrap_or(&self.embedding_model),
            input: text,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request to OpenAI")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI embeddings error ({}): {}", status, snippet(&error_text, 500));
        }

        let response: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI embedding response")?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .context("OpenAI returned no embedding")
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

// ============================================================================
// Message types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a user message with text and one PNG image as a data URL.
    pub fn user_with_image(text: impl Into<String>, png: &[u8]) -> Self {
        let data_url = format!("data:image/png;base64,{}", BASE64.encode(png));
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_image_message_shape() {
        let msg = Message::user_with_image("read this", &[1, 2, 3]);
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "read this"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AQID"}}
                ]
            })
        );
    }

    #[test]
    fn test_response_without_usage_parses() {
        let raw = r#"{"choices":[{"message":{"content":"hello"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.usage.is_none());
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hello"));
    }
}
