//! Ollama provider: generation, embeddings and model listing.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{snippet, Embedder, LlmProvider, ProviderKind};
use crate::config::OllamaSettings;

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(client: Client, settings: &OllamaSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        }
    }

    async fn generate(&self, model: &str, prompt: &str, images: Vec<String>) -> Result<String> {
        let body = GenerateRequest {
            model,
            prompt,
            images,
            stream: false,
        };

        info!("OllamaClient: /api/generate model={}", model);

        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .context("Failed to reach Ollama")?;

        let resp = check(resp).await?;
        let parsed: GenerateResponse = resp.json().await.context("Failed to parse Ollama response")?;
        debug!("OllamaClient: {} chars generated", parsed.response.len());
        Ok(parsed.response)
    }

    /// Names of installed models (`/api/tags`).
    pub async fn list_models(&self) -> Result<Vec<String>> {
        self.model_names("api/tags").await
    }

    /// Names of models currently loaded in memory (`/api/ps`).
    pub async fn list_running_models(&self) -> Result<Vec<String>> {
        self.model_names("api/ps").await
    }

    async fn model_names(&self, path: &str) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .send()
            .await
            .context("Failed to reach Ollama")?;

        let resp = check(resp).await?;
        let parsed: ModelList = resp.json().await.context("Failed to parse Ollama model list")?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    anyhow::bail!("Ollama API error ({}): {}", status, snippet(&text, 500))
}

#[async_trait::async_trait]
impl LlmProvider for OllamaClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn transcribe(&self, png: &[u8], prompt: &str, model: Option<&str>) -> Result<String> {
        self.generate(model.unwrap_or(&self.model), prompt, vec![BASE64.encode(png)])
            .await
    }

    async fn complete(&self, prompt: &str, model: Option<&str>, _max_tokens: u32) -> Result<String> {
        self.generate(model.unwrap_or(&self.model), prompt, Vec::new())
            .await
    }
}

#[async_trait::async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str, model: Option<&str>) -> Result<Vec<f32>> {
        let body = EmbeddingRequest {
            model: model.unwrap_or(&self.model),
            prompt: text,
        };

        let resp = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&body)
            .send()
            .await
            .context("Failed to reach Ollama")?;

        let resp = check(resp).await?;
        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .context("Failed to parse Ollama embedding")?;
        Ok(parsed.embedding)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}
