//! OCR upload route

use axum::{
    extract::{Multipart, Query, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::db::{NewText, ProjectRepository, TextRepository};
use crate::error::{AppError, Result};
use crate::llm::{ProviderKind, Providers};
use crate::ocr::OcrOutcome;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ocr", post(ocr_upload))
        .route("/ocr/", post(ocr_upload))
}

#[derive(Debug, Deserialize)]
pub struct OcrQuery {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub project_id: Option<i64>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OcrResponse {
    pub id: i64,
    pub text: String,
    pub provider: String,
    pub project_id: Option<i64>,
    pub name: Option<String>,
}

struct Upload {
    filename: Option<String>,
    data: Vec<u8>,
}

/// Pull the `file` part out of the form, insisting on an image content type.
async fn read_image(multipart: &mut Multipart) -> Result<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("Multipart error: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let is_image = field
            .content_type()
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return Err(AppError::bad_request("File must be an image."));
        }

        let filename = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::bad_request(format!("Failed to read file: {}", e)))?
            .to_vec();
        return Ok(Upload { filename, data });
    }

    Err(AppError::bad_request("No file uploaded"))
}

/// Embedding stored alongside the text. Failures only cost the embedding.
async fn embed_for_storage(providers: &Providers, outcome: &OcrOutcome, model: Option<&str>) -> Option<Vec<f32>> {
    if outcome.text.trim().is_empty() {
        return None;
    }

    let (kind, model) = if outcome.provider.starts_with("ollama") {
        (ProviderKind::Ollama, model)
    } else {
        (ProviderKind::OpenAi, None)
    };
    let Some(embedder) = providers.embedder(kind) else {
        debug!("No {} embedder configured, storing text without embedding", kind.as_str());
        return None;
    };

    match embedder.embed(&outcome.text, model).await {
        Ok(vector) if vector.iter().all(|v| v.is_finite()) => Some(vector),
        Ok(_) => {
            warn!("Embedding has non-finite values, storing text without one");
            None
        }
        Err(e) => {
            warn!("Embedding failed, storing text without one: {:#}", e);
            None
        }
    }
}

async fn ocr_upload(
    State(state): State<AppState>,
    Query(query): Query<OcrQuery>,
    mut multipart: Multipart,
) -> Result<Json<OcrResponse>> {
    let upload = read_image(&mut multipart).await?;

    if let Some(project_id) = query.project_id {
        ProjectRepository::new(&state.db).get(project_id).await?;
    }

    let kind = state.providers.resolve_kind(query.provider.as_deref());
    let model = query.model.as_deref().map(str::trim).filter(|m| !m.is_empty());
    info!(
        "Received image: {} ({} bytes) for provider {}",
        upload.filename.as_deref().unwrap_or("<unnamed>"),
        upload.data.len(),
        kind.as_str()
    );

    let outcome = state.ocr.extract(&upload.data, kind, model).await?;
    let embedding = embed_for_storage(&state.providers, &outcome, model).await;

    let name = query
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    let content_hash = format!("{:x}", Sha256::digest(&upload.data));

    let saved = TextRepository::new(&state.db)
        .insert(&NewText {
            filename: upload.filename,
            name,
            text: outcome.text,
            provider: Some(outcome.provider),
            content_hash: Some(content_hash),
            embedding,
            project_id: query.project_id,
        })
        .await?;

    Ok(Json(OcrResponse {
        id: saved.id,
        text: saved.text,
        provider: saved.provider.unwrap_or_default(),
        project_id: saved.project_id,
        name: saved.name,
    }))
}
