//! Server settings.
//!
//! Everything is read from the environment (after loading `.env` if present).
//! Provider credentials are optional: a provider without a key is simply not
//! registered, and requests naming it are rejected.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::llm::ProviderKind;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_DATABASE_URL: &str = "sqlite://ocr_platform.db";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub database: DatabaseSettings,
    pub max_upload_bytes: usize,
    pub default_provider: ProviderKind,
    pub request_timeout: Duration,
    pub openai: Option<OpenAiSettings>,
    pub gemini: Option<GeminiSettings>,
    pub ollama: OllamaSettings,
    pub tesseract: TesseractSettings,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct OllamaSettings {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct TesseractSettings {
    pub binary: String,
    pub language: String,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let bind_addr = match parse_var(&get, "BIND_ADDR")? {
            Some(addr) => addr,
            None => DEFAULT_BIND_ADDR.parse()?,
        };

        let default_provider = match get("LLM_PROVIDER") {
            Some(raw) => ProviderKind::parse(&raw)
                .with_context(|| format!("LLM_PROVIDER: unknown provider '{}'", raw))?,
            None => ProviderKind::OpenAi,
        };

        let openai = get("OPENAI_API_KEY").map(|api_key| OpenAiSettings {
            api_key,
            base_url: or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            model: or("OPENAI_MODEL", "gpt-4o"),
            embedding_model: or("OPENAI_EMBEDDING_MODEL", "text-embedding-3-small"),
        });

        let gemini = get("GEMINI_API_KEY").map(|api_key| GeminiSettings {
            api_key,
            base_url: or(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            model: or("GEMINI_MODEL", "gemini-2.0-flash"),
        });

        Ok(Self {
            bind_addr,
            database: DatabaseSettings {
                url: or("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: parse_var(&get, "DATABASE_MAX_CONNECTIONS")?.unwrap_or(5),
            },
            max_upload_bytes: parse_var(&get, "MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            default_provider,
            request_timeout: Duration::from_secs(
                parse_var(&get, "LLM_TIMEOUT_SECS")?.unwrap_or(120),
            ),
            openai,
            gemini,
            ollama: OllamaSettings {
                base_url: or("OLLAMA_URL", "http://localhost:11434"),
                model: or("OLLAMA_MODEL", "llama3"),
            },
            tesseract: TesseractSettings {
                binary: or("TESSERACT_BIN", "tesseract"),
                language: or("TESSERACT_LANG", "eng"),
            },
        })
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{}: invalid value '{}'", key, raw))
        })
        .transpose()
}
