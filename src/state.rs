//! Application state shared across handlers

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::llm::Providers;
use crate::ocr::OcrPipeline;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub providers: Arc<Providers>,
    pub ocr: Arc<OcrPipeline>,
}

impl AppState {
    pub fn new(db: SqlitePool, providers: Providers, ocr: OcrPipeline) -> Self {
        Self {
            db,
            providers: Arc::new(providers),
            ocr: Arc::new(ocr),
        }
    }
}
