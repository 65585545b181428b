//! LLM summaries of one text, an ad-hoc body, or a whole project.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::db::TextRepository;
use crate::error::{AppError, Result};
use crate::llm::Providers;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummarizeRequest {
    pub text_id: Option<i64>,
    pub text: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub summary_length: Option<String>,
    pub format: Option<String>,
    pub instructions: Option<String>,
    pub project_id: Option<i64>,
    pub summarize_all: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummarizeResponse {
    pub summary: String,
    pub provider: String,
    pub length: SummaryLength,
    pub format: SummaryFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Short,
    Medium,
    Long,
}

impl SummaryLength {
    /// Unknown or missing values mean `Medium`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("short") => Self::Short,
            Some("long") => Self::Long,
            _ => Self::Medium,
        }
    }

    fn clause(&self) -> &'static str {
        match self {
            Self::Short => "Keep it very brief: 2-3 sentences OR 3 bullet points maximum.",
            Self::Medium => "Keep it concise: ~4-6 sentences OR 3-5 bullet points.",
            Self::Long => "Provide a detailed summary: 1-2 paragraphs OR 5-8 bullet points.",
        }
    }

    pub fn max_tokens(&self) -> u32 {
        match self {
            Self::Short => 250,
            Self::Medium => 400,
            Self::Long => 800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryFormat {
    Bullets,
    Plain,
}

impl SummaryFormat {
    /// Unknown or missing values mean `Bullets`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("plain") => Self::Plain,
            _ => Self::Bullets,
        }
    }

    fn clause(&self) -> &'static str {
        match self {
            Self::Bullets => "Return the summary as a bullet point list.",
            Self::Plain => "Return the summary as plain prose text (no bullets).",
        }
    }
}

pub fn build_prompt(length: SummaryLength, format: SummaryFormat, instructions: Option<&str>, body: &str) -> String {
    let extra = match instructions.map(str::trim) {
        Some(guidance) if !guidance.is_empty() => format!(" Additional guidance: {}", guidance),
        _ => String::new(),
    };
    format!(
        "Summarize the following text. {} {}{}\n\nTEXT:\n{}",
        length.clause(),
        format.clause(),
        extra,
        body
    )
}

/// Resolve which text the request refers to.
async fn source_text(pool: &SqlitePool, req: &SummarizeRequest) -> Result<String> {
    if let Some(text) = &req.text {
        return Ok(text.clone());
    }

    let repo = TextRepository::new(pool);
    if req.summarize_all.unwrap_or(false) {
        let bodies = repo.bodies_oldest_first(req.project_id).await?;
        if bodies.is_empty() {
            return Err(AppError::not_found("No texts found to summarize"));
        }
        return Ok(bodies.join("\n\n"));
    }

    match req.text_id {
        Some(id) => Ok(repo.get(id).await?.text),
        None => Err(AppError::bad_request(
            "Provide text_id, text, or set summarize_all=true",
        )),
    }
}

pub async fn summarize(pool: &SqlitePool, providers: &Providers, req: &SummarizeRequest) -> Result<SummarizeResponse> {
    let length = SummaryLength::parse(req.summary_length.as_deref());
    let format = SummaryFormat::parse(req.format.as_deref());
    let body = source_text(pool, req).await?;

    let kind = providers.resolve_kind(req.provider.as_deref());
    let llm = providers.require_llm(kind)?;
    let model = req
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(llm.default_model())
        .to_string();

    let prompt = build_prompt(length, format, req.instructions.as_deref(), &body);
    info!(
        "Summarize: {} chars via {}:{} ({:?}, {:?})",
        body.chars().count(),
        kind.as_str(),
        model,
        length,
        format
    );
    let summary = llm.complete(&prompt, Some(&model), length.max_tokens()).await?;

    Ok(SummarizeResponse {
        summary,
        provider: format!("{}:{}", kind.as_str(), model),
        length,
        format,
    })
}
