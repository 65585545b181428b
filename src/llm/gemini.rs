//! Google Gemini provider (generateContent REST API).

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{snippet, LlmProvider, ProviderKind};
use crate::config::GeminiSettings;

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(client: Client, settings: &GeminiSettings) -> Self {
        Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        }
    }

    async fn generate(&self, model: &str, parts: Vec<Part>) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let body = GenerateRequest {
            contents: vec![Content { parts }],
        };

        info!("GeminiClient: calling generateContent model={}", model);

        let resp = self
            .client
            .post(&url)
            .header("X-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Gemini")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error ({}): {}", status, snippet(&text, 500));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        Ok(parsed.joined_text())
    }
}

#[async_trait::async_trait]
impl LlmProvider for GeminiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn transcribe(&self, png: &[u8], prompt: &str, model: Option<&str>) -> Result<String> {
        let parts = vec![
            Part::Text {
                text: prompt.to_string(),
            },
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: "image/png".to_string(),
                    data: BASE64.encode(png),
                },
            },
        ];
        self.generate(model.unwrap_or(&self.model), parts).await
    }

    async fn complete(&self, prompt: &str, model: Option<&str>, _max_tokens: u32) -> Result<String> {
        let parts = vec![Part::Text {
            text: prompt.to_string(),
        }];
        self.generate(model.unwrap_or(&self.model), parts).await
    }
}

// ── Gemini API request/response types ───────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Other(serde_json::Value),
}

#[derive(Serialize, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateResponse {
    /// Every text part across all candidates, newline-joined and trimmed.
    fn joined_text(&self) -> String {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| match p {
                Part::Text { text } if !text.is_empty() => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joined_text_across_candidates() {
        let raw = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "first line"}, {"text": ""}]}},
                {"content": {"parts": [{"text": "second line\n"}]}},
                {"finishReason": "SAFETY"}
            ]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.joined_text(), "first line\nsecond line");
    }

    #[test]
    fn test_empty_response() {
        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.joined_text(), "");
    }

    #[test]
    fn test_inline_data_serialization() {
        let part = Part::InlineData {
            inline_data: InlineData {
                mime_type: "image/png".to_string(),
                data: "AQID".to_string(),
            },
        };
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["inlineData"]["mimeType"], "image/png");
        assert_eq!(value["inlineData"]["data"], "AQID");
    }
}
