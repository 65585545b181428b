//! HTTP routes
//!
//! Collection endpoints are registered with and without the trailing slash
//! because the web client calls both forms.

pub mod analytics;
pub mod explorer;
pub mod health;
pub mod models;
pub mod ocr;
pub mod projects;
pub mod summaries;
pub mod texts;

use axum::Router;
use serde::Serialize;

use crate::state::AppState;

/// `{"message": ...}` body for destructive operations
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Create the full API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(projects::router())
        .merge(ocr::router())
        .merge(texts::router())
        .merge(summaries::router())
        .merge(models::router())
        .merge(explorer::router())
        .merge(analytics::router())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use sqlx::SqlitePool;
    use tower::ServiceExt;

    use crate::db::test_pool;
    use crate::llm::{Embedder, ProviderKind, Providers};
    use crate::ocr::tests::{no_tesseract, providers_with, ScriptedProvider};
    use crate::ocr::OcrPipeline;
    use crate::state::AppState;

    /// Embedder returning one fixed vector for every input.
    pub struct FixedEmbedder(pub Vec<f32>);

    #[async_trait::async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str, _model: Option<&str>) -> anyhow::Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    /// Embedder that always fails, like an unreachable embeddings endpoint.
    pub struct FailingEmbedder;

    #[async_trait::async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str, _model: Option<&str>) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("embeddings endpoint returned 500")
        }
    }

    /// Fixed-vector embedder that remembers which model each call asked for.
    pub struct RecordingEmbedder {
        vector: Vec<f32>,
        pub models: Mutex<Vec<Option<String>>>,
    }

    impl RecordingEmbedder {
        pub fn new(vector: Vec<f32>) -> Arc<Self> {
            Arc::new(Self {
                vector,
                models: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl Embedder for RecordingEmbedder {
        async fn embed(&self, _text: &str, model: Option<&str>) -> anyhow::Result<Vec<f32>> {
            self.models.lock().unwrap().push(model.map(str::to_string));
            Ok(self.vector.clone())
        }
    }

    pub async fn test_app(llms: Vec<Arc<ScriptedProvider>>, embedding: Option<Vec<f32>>) -> (Router, SqlitePool) {
        let mut providers = providers_with(llms);
        if let Some(vector) = embedding {
            providers.insert_embedder(ProviderKind::OpenAi, Arc::new(FixedEmbedder(vector)));
        }
        app_with(providers).await
    }

    /// App over a fresh database with a caller-built provider registry.
    pub async fn app_with(providers: Providers) -> (Router, SqlitePool) {
        let pool = test_pool().await;
        let ocr = OcrPipeline::new(providers.clone(), no_tesseract());
        let app = super::router(AppState::new(pool.clone(), providers, ocr));
        (app, pool)
    }

    pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub fn delete(uri: &str) -> Request<Body> {
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    pub fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}
