//! Ollama model listing

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::error::Result;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ollama/models", get(installed_models))
        .route("/ollama/models/running", get(running_models))
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub models: Vec<String>,
}

async fn installed_models(State(state): State<AppState>) -> Result<Json<ModelList>> {
    let models = state.providers.ollama().list_models().await?;
    Ok(Json(ModelList { models }))
}

async fn running_models(State(state): State<AppState>) -> Result<Json<ModelList>> {
    let models = state.providers.ollama().list_running_models().await?;
    Ok(Json(ModelList { models }))
}
