//! Saved text API routes: listing, search, similarity and stats

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::MessageResponse;
use crate::db::{SavedText, TextRepository, TextStats};
use crate::error::Result;
use crate::similarity::{self, ScoredText, SimilarityQuery};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/texts", get(list_texts))
        .route("/texts/", get(list_texts))
        .route("/texts/search", get(search_texts))
        .route("/texts/similarity", post(similar_texts))
        .route("/texts/:id", get(get_text).delete(delete_text))
        .route("/stats", get(text_stats))
}

#[derive(Debug, Deserialize)]
pub struct ProjectFilter {
    pub project_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub project_id: Option<i64>,
}

async fn list_texts(
    State(state): State<AppState>,
    Query(filter): Query<ProjectFilter>,
) -> Result<Json<Vec<SavedText>>> {
    let texts = TextRepository::new(&state.db).list(filter.project_id).await?;
    Ok(Json(texts))
}

async fn search_texts(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SavedText>>> {
    let texts = TextRepository::new(&state.db)
        .search(&query.q, query.project_id)
        .await?;
    Ok(Json(texts))
}

async fn similar_texts(
    State(state): State<AppState>,
    Json(query): Json<SimilarityQuery>,
) -> Result<Json<Vec<ScoredText>>> {
    let matches = similarity::search(&state.db, &state.providers, &query).await?;
    Ok(Json(matches))
}

async fn get_text(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<SavedText>> {
    let text = TextRepository::new(&state.db).get(id).await?;
    Ok(Json(text))
}

async fn delete_text(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    TextRepository::new(&state.db).delete(id).await?;
    Ok(Json(MessageResponse::new(format!("Deleted text {}", id))))
}

async fn text_stats(
    State(state): State<AppState>,
    Query(filter): Query<ProjectFilter>,
) -> Result<Json<TextStats>> {
    let stats = TextRepository::new(&state.db).stats(filter.project_id).await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::db::{NewText, TextRepository};
    use crate::llm::ProviderKind;
    use crate::ocr::tests::providers_with;
    use crate::routes::test_support::{app_with, delete, get, post_json, send, test_app, FixedEmbedder, RecordingEmbedder};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_search_get_delete() {
        let (app, pool) = test_app(vec![], None).await;
        let repo = TextRepository::new(&pool);
        let saved = repo
            .insert(&NewText {
                filename: Some("memo.png".into()),
                text: "Quarterly Report draft".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        repo.insert(&NewText {
            text: "shopping list".into(),
            ..Default::default()
        })
        .await
        .unwrap();

        let (status, list) = send(&app, get("/texts/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 2);

        let (_, hits) = send(&app, get("/texts/search?q=report")).await;
        assert_eq!(hits.as_array().unwrap().len(), 1);
        assert_eq!(hits[0]["filename"], "memo.png");

        repo.insert(&NewText {
            text: "Benvenuti nella città di Ñandú".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        let (_, hits) = send(&app, get("/texts/search?q=CITT%C3%80")).await;
        assert_eq!(hits.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, get("/texts/search?q=")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, get(&format!("/texts/{}", saved.id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "Quarterly Report draft");
        assert!(body.get("embedding").is_none());

        let (status, body) = send(&app, delete(&format!("/texts/{}", saved.id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], format!("Deleted text {}", saved.id));

        let (status, _) = send(&app, delete(&format!("/texts/{}", saved.id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, stats) = send(&app, get("/stats")).await;
        assert_eq!(stats["count"], 2);
    }

    #[tokio::test]
    async fn test_similarity_ranks_by_cosine() {
        let (app, pool) = test_app(vec![], Some(vec![1.0, 0.0])).await;
        let repo = TextRepository::new(&pool);
        for (text, vector) in [("north", vec![0.0, 1.0]), ("east", vec![0.9, 0.1]), ("odd", vec![1.0, 0.0, 0.0])] {
            repo.insert(&NewText {
                text: text.into(),
                embedding: Some(vector),
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let (status, body) = send(&app, post_json("/texts/similarity", json!({"query": "east"}))).await;
        assert_eq!(status, StatusCode::OK);
        let hits = body.as_array().unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0]["text"], "east");
        assert!(hits[0]["score"].as_f64().unwrap() > hits[1]["score"].as_f64().unwrap());

        let (status, _) = send(&app, post_json("/texts/similarity", json!({"query": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_similarity_with_ollama_embedder() {
        let recorder = RecordingEmbedder::new(vec![0.0, 1.0]);
        let mut providers = providers_with(vec![]);
        providers.insert_embedder(ProviderKind::Ollama, recorder.clone());
        providers.insert_embedder(ProviderKind::OpenAi, Arc::new(FixedEmbedder(vec![1.0, 0.0])));
        let (app, pool) = app_with(providers).await;

        let repo = TextRepository::new(&pool);
        for (text, vector) in [("east", vec![1.0, 0.0]), ("north", vec![0.1, 0.9])] {
            repo.insert(&NewText {
                text: text.into(),
                embedding: Some(vector),
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let (status, body) = send(
            &app,
            post_json(
                "/texts/similarity",
                json!({"query": "up", "provider": "ollama", "model": "nomic-embed-text"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["text"], "north");
        assert_eq!(*recorder.models.lock().unwrap(), vec![Some("nomic-embed-text".to_string())]);

        let (app, _pool) = test_app(vec![], Some(vec![1.0, 0.0])).await;
        let (status, body) = send(
            &app,
            post_json("/texts/similarity", json!({"query": "up", "provider": "ollama"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No embedding provider configured for ollama");
    }
}
