//! OCR Platform - image transcription, storage and summarization server.

mod config;
mod db;
mod error;
mod llm;
mod ocr;
mod pdf_export;
mod routes;
mod similarity;
mod state;
mod summarize;

use axum::extract::DefaultBodyLimit;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Settings;
use llm::Providers;
use ocr::tesseract::Tesseract;
use ocr::OcrPipeline;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load settings (reads .env if present)
    let settings = Settings::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ocr_platform=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = db::create_pool(&settings.database.url, settings.database.max_connections).await?;
    info!("Database ready at {}", settings.database.url);

    let providers = Providers::from_settings(&settings)?;
    info!(
        "LLM providers initialized (default: {}, openai: {}, gemini: {})",
        settings.default_provider.as_str(),
        settings.openai.is_some(),
        settings.gemini.is_some()
    );

    let ocr = OcrPipeline::new(providers.clone(), Tesseract::new(&settings.tesseract));
    let state = AppState::new(pool, providers, ocr);

    let app = routes::router(state)
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    info!("Server listening on {}", settings.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown..."),
    }
}
