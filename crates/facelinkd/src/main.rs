use anyhow::{Context, Result};
use facelink_core::cooldown::CooldownTracker;
use facelink_core::encoder::{FaceEncoder, MockEncoder};
use facelink_core::onnx::OnnxEncoder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod store;

use config::Config;
use dbus_interface::FacelinkService;
use engine::RecognitionEngine;
use store::{RecognitionStore, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facelinkd starting");

    let config = Config::from_env();
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data dir {}", parent.display()))?;
    }

    let store = SqliteStore::open(&config.db_path).await?;
    tracing::info!(path = %config.db_path.display(), "database opened");

    let persisted = store.load_cooldowns().await?;
    tracing::info!(entries = persisted.len(), "cooldown state restored");
    let cooldowns = CooldownTracker::preloaded(persisted);

    let encoder: Arc<dyn FaceEncoder> = match &config.encoder_model {
        Some(path) => {
            let encoder = OnnxEncoder::load(&path.to_string_lossy(), config.embedding_dim)?;
            tracing::info!(path = %path.display(), "ONNX face encoder loaded");
            Arc::new(encoder)
        }
        None => {
            tracing::warn!(
                "FACELINK_ENCODER_MODEL not set — using deterministic mock encoder (dev only)"
            );
            Arc::new(MockEncoder::new(config.embedding_dim))
        }
    };

    let engine = Arc::new(RecognitionEngine::new(store, encoder, cooldowns, &config));

    let _conn = zbus::connection::Builder::session()?
        .name("org.facelink.Recognition1")?
        .serve_at(
            "/org/facelink/Recognition1",
            FacelinkService::new(Arc::clone(&engine)),
        )?
        .build()
        .await
        .context("registering on the session bus")?;

    tracing::info!(
        threshold = config.distance_threshold,
        cooldown_minutes = config.cooldown_minutes,
        "facelinkd ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("facelinkd shutting down");

    Ok(())
}
