//! Summary generation and PDF export routes

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use crate::error::Result;
use crate::pdf_export::{self, PdfRequest};
use crate::state::AppState;
use crate::summarize::{self, SummarizeRequest, SummarizeResponse};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/texts/summarize", post(summarize_text))
        .route("/summaries/pdf", post(summary_pdf))
}

async fn summarize_text(
    State(state): State<AppState>,
    Json(req): Json<SummarizeRequest>,
) -> Result<Json<SummarizeResponse>> {
    let response = summarize::summarize(&state.db, &state.providers, &req).await?;
    Ok(Json(response))
}

async fn summary_pdf(Json(req): Json<PdfRequest>) -> Result<impl IntoResponse> {
    let bytes = pdf_export::render_summary(&req)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"summary.pdf\""),
        ],
        bytes,
    ))
}
