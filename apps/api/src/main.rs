mod assistant;
mod capabilities;
mod chat;
mod config;
mod errors;
mod intent;
mod llm_client;
mod model;
mod models;
mod routes;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::assistant::ModelAssistant;
use crate::capabilities::{Capabilities, StaticCapabilities};
use crate::chat::ChatService;
use crate::config::Config;
use crate::intent::IntentResolver;
use crate::llm_client::HttpInferenceRuntime;
use crate::model::{ModelCatalog, ModelManager};
use crate::models::profile::Profile;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Neo API v{}", env!("CARGO_PKG_VERSION"));

    // Profile and rule table are fixed for the life of the process
    let profile = Arc::new(Profile::load(config.profile_path.as_deref())?);
    let intents = Arc::new(
        IntentResolver::new(profile.clone()).context("Failed to compile the intent rule table")?,
    );
    info!("Profile loaded for {}", profile.name);

    let catalog = ModelCatalog::load(config.model_catalog_path.as_deref())?;
    let model_dir = prepare_model_dir(config.model_dir.as_deref()).await;
    let capabilities: Arc<dyn Capabilities> = Arc::new(StaticCapabilities::new(
        model_dir.is_some(),
        config.inference_url.is_some(),
    ));
    info!(
        filesystem = capabilities.has_filesystem(),
        inference_runtime = capabilities.has_inference_runtime(),
        "Capabilities resolved"
    );

    let mut manager = ModelManager::new(catalog, model_dir.unwrap_or_default(), capabilities.clone());
    if let Some(min_bytes) = config.min_model_bytes {
        manager = manager.with_min_bytes(min_bytes);
    }
    let models = Arc::new(manager);

    let purged = models.reconcile_on_startup().await?;
    for path in &purged {
        warn!("Removed incomplete model file {}", path.display());
    }

    if config.prefetch_model && models.is_available() {
        tokio::spawn(prefetch_default_model(models.clone()));
    }

    let assistant = config.inference_url.as_ref().map(|url| {
        info!("Model-backed chat enabled (inference server: {url})");
        Arc::new(ModelAssistant::new(
            intents.clone(),
            models.clone(),
            Arc::new(HttpInferenceRuntime::new(url.clone())),
            capabilities.clone(),
        ))
    });
    let chat = Arc::new(ChatService::new(intents, assistant, config.chat_fallback));

    // Build app state
    let state = AppState {
        config: config.clone(),
        profile,
        chat: chat.clone(),
        models,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    chat.release().await;
    info!("Shut down");
    Ok(())
}

/// Creates the model directory. `None` (no filesystem capability) when
/// there is no directory or it cannot be created.
async fn prepare_model_dir(dir: Option<&Path>) -> Option<PathBuf> {
    let Some(dir) = dir else {
        warn!("No model directory available; model storage disabled");
        return None;
    };
    match tokio::fs::create_dir_all(dir).await {
        Ok(()) => {
            info!("Model directory: {}", dir.display());
            Some(dir.to_path_buf())
        }
        Err(e) => {
            warn!("Cannot use model directory {}: {e}; model storage disabled", dir.display());
            None
        }
    }
}

/// Downloads the default model unless it is already on disk.
async fn prefetch_default_model(models: Arc<ModelManager>) {
    let artifact = models.catalog().default_artifact().clone();
    info!(model_id = %artifact.id, "Prefetching default model");
    let result = models
        .download_to_path(artifact.clone(), |percent| {
            if percent % 10 == 0 {
                info!(model_id = %artifact.id, "Prefetch {percent}%");
            }
        })
        .await;
    match result {
        Ok(path) => info!("Default model ready at {}", path.display()),
        Err(e) => warn!("Prefetching the default model failed: {e}"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
