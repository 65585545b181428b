//! LLM provider abstraction.
//!
//! Defines the [`LlmProvider`] and [`Embedder`] traits so OpenAI, Gemini and
//! Ollama can be swapped via the `provider` query/body parameter, plus the
//! [`Providers`] registry built once at startup.

pub mod gemini;
pub mod ollama;
pub mod openai;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::Settings;
use crate::error::AppError;
use gemini::GeminiClient;
use ollama::OllamaClient;
use openai::OpenAiClient;

/// Known provider identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Ollama,
}

impl ProviderKind {
    /// Parse a query-parameter string into a provider kind.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "gemini" => Some(Self::Gemini),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }

    /// Name of the env var holding the credential, for error messages.
    fn key_var(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::Ollama => "OLLAMA_URL",
        }
    }
}

/// Async trait implemented by each chat/vision backend.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn default_model(&self) -> &str;

    /// Read the text out of a PNG image.
    async fn transcribe(&self, png: &[u8], prompt: &str, model: Option<&str>)
        -> anyhow::Result<String>;

    /// Plain text completion.
    async fn complete(&self, prompt: &str, model: Option<&str>, max_tokens: u32)
        -> anyhow::Result<String>;
}

/// Backends able to produce text embeddings.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, model: Option<&str>) -> anyhow::Result<Vec<f32>>;
}

/// Registry of configured providers.
#[derive(Clone)]
pub struct Providers {
    llms: HashMap<ProviderKind, Arc<dyn LlmProvider>>,
    embedders: HashMap<ProviderKind, Arc<dyn Embedder>>,
    ollama: OllamaClient,
    default_kind: ProviderKind,
}

impl Providers {
    /// Build the registry from settings. Providers without credentials are skipped.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;

        let ollama = OllamaClient::new(client.clone(), &settings.ollama);
        let mut providers = Self::new(ollama.clone(), settings.default_provider);
        providers.insert_llm(Arc::new(ollama.clone()));
        providers.insert_embedder(ProviderKind::Ollama, Arc::new(ollama));

        if let Some(openai_settings) = &settings.openai {
            let openai = OpenAiClient::new(client.clone(), openai_settings);
            providers.insert_llm(Arc::new(openai.clone()));
            providers.insert_embedder(ProviderKind::OpenAi, Arc::new(openai));
        }

        if let Some(gemini_settings) = &settings.gemini {
            providers.insert_llm(Arc::new(GeminiClient::new(client, gemini_settings)));
        }

        Ok(providers)
    }

    /// Empty registry; callers register providers explicitly.
    pub fn new(ollama: OllamaClient, default_kind: ProviderKind) -> Self {
        Self {
            llms: HashMap::new(),
            embedders: HashMap::new(),
            ollama,
            default_kind,
        }
    }

    pub fn insert_llm(&mut self, provider: Arc<dyn LlmProvider>) {
        self.llms.insert(provider.kind(), provider);
    }

    pub fn insert_embedder(&mut self, kind: ProviderKind, embedder: Arc<dyn Embedder>) {
        self.embedders.insert(kind, embedder);
    }

    /// Resolve a user-supplied provider name; unknown or absent names use the default.
    pub fn resolve_kind(&self, requested: Option<&str>) -> ProviderKind {
        requested
            .and_then(ProviderKind::parse)
            .unwrap_or(self.default_kind)
    }

    /// Provider for `kind`, if it is configured.
    pub fn llm(&self, kind: ProviderKind) -> Option<Arc<dyn LlmProvider>> {
        self.llms.get(&kind).cloned()
    }

    /// Like [`Providers::llm`] but reports a missing provider as a client error.
    pub fn require_llm(&self, kind: ProviderKind) -> Result<Arc<dyn LlmProvider>, AppError> {
        self.llm(kind)
            .ok_or_else(|| AppError::bad_request(format!("{} not set", kind.key_var())))
    }

    pub fn embedder(&self, kind: ProviderKind) -> Option<Arc<dyn Embedder>> {
        self.embedders.get(&kind).cloned()
    }

    /// Client used for Ollama model listing.
    pub fn ollama(&self) -> &OllamaClient {
        &self.ollama
    }
}

/// Return at most `max` bytes of `body` (on a char boundary) for log/error messages.
pub(crate) fn snippet(body: &str, max: usize) -> &str {
    if body.len() <= max {
        return body;
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
