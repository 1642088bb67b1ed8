pub mod api;
pub mod appointment;
pub mod auth;
pub mod config;
pub mod core_state;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod sharing;
pub mod storage;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::core_state::CoreState;
use crate::db::SqliteStore;
use crate::error::StartupError;
use crate::pipeline::{FileTextExtractor, OllamaClient, OllamaSummarizer};
use crate::storage::FileStore;

/// Start the server and block until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = Config::from_env()?;
    tokio::fs::create_dir_all(config.uploads_dir()).await?;
    tracing::info!(data_dir = %config.data_dir.display(), "Using data directory");

    let core = Arc::new(build_core(config)?);
    let server = api::start_server(core.clone(), core.config.bind_addr).await?;
    tracing::info!(addr = %server.addr, "Listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, shutting down");
    server.stop().await;
    Ok(())
}

/// Wire production collaborators: SQLite records, on-disk uploads and an
/// Ollama-backed extractor and summarizer. No second-factor verifier is
/// configured, so accounts with TOTP enabled cannot log in.
pub fn build_core(config: Config) -> Result<CoreState, StartupError> {
    let store = Arc::new(SqliteStore::open(&config.database_path())?);
    let files = Arc::new(FileStore::new(config.uploads_dir(), config.max_upload_bytes));
    let client = OllamaClient::new(&config.ollama_url);
    let extractor = Arc::new(FileTextExtractor::new(
        files.clone(),
        client.clone(),
        config.ocr_model.clone(),
    ));
    let summarizer = Arc::new(OllamaSummarizer::new(client, config.summary_model.clone()));

    Ok(CoreState::new(config, store, files, extractor, summarizer, None))
}
