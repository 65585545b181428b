//! Embedding similarity search over saved texts.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use crate::db::{SavedText, TextRepository};
use crate::error::{AppError, Result};
use crate::llm::{ProviderKind, Providers};

/// Number of matches returned per query.
pub const TOP_K: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct SimilarityQuery {
    pub query: String,
    pub project_id: Option<i64>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredText {
    #[serde(flatten)]
    pub text: SavedText,
    pub score: f32,
}

/// Cosine similarity, or `None` when the lengths differ or either vector is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32)
}

/// Score candidates against `query` and keep the best `limit`, highest first.
pub fn rank(query: &[f32], candidates: Vec<(SavedText, Vec<f32>)>, limit: usize) -> Vec<ScoredText> {
    let mut scored: Vec<ScoredText> = candidates
        .into_iter()
        .filter_map(|(text, vector)| {
            cosine_similarity(query, &vector).map(|score| ScoredText { text, score })
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit);
    scored
}

/// Embed the query and return the closest stored texts.
pub async fn search(pool: &SqlitePool, providers: &Providers, req: &SimilarityQuery) -> Result<Vec<ScoredText>> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(AppError::bad_request("Query must not be empty"));
    }

    let kind = match req.provider.as_deref().and_then(ProviderKind::parse) {
        Some(ProviderKind::Ollama) => ProviderKind::Ollama,
        _ => ProviderKind::OpenAi,
    };
    let embedder = providers
        .embedder(kind)
        .ok_or_else(|| AppError::bad_request(format!("No embedding provider configured for {}", kind.as_str())))?;

    let model = req.model.as_deref().map(str::trim).filter(|m| !m.is_empty());
    let vector = embedder.embed(query, model).await?;

    let candidates = TextRepository::new(pool).with_embeddings(req.project_id).await?;
    debug!(
        "Similarity: {}-dim query against {} candidate(s)",
        vector.len(),
        candidates.len()
    );

    Ok(rank(&vector, candidates, TOP_K))
}
