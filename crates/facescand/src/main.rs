use anyhow::{Context, Result};
use facescan_core::enrollment;
use facescan_core::{FaceModels, FacePipeline};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facescand starting");

    let config = config::Config::from_env()?;
    tracing::info!(?config, "configuration loaded");

    // Load models and enroll the dataset synchronously (fail-fast).
    let mut models = FaceModels::load(&config.model_paths(), config.detector_options(), config.intra_threads)
        .context("loading face models")?;
    let matcher = enrollment::build_matcher(&config.dataset_dir, &mut models, config.match_threshold)
        .with_context(|| format!("enrolling dataset {}", config.dataset_dir.display()))?;
    tracing::info!(
        labels = matcher.labeled().len(),
        threshold = matcher.distance_threshold(),
        "dataset enrolled"
    );

    let pipeline: Box<dyn FacePipeline> = Box::new(models);
    let engine = engine::spawn_engine(pipeline, matcher)?;

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("creating upload directory {}", config.upload_dir.display()))?;

    let state = Arc::new(server::AppState {
        engine,
        upload_dir: config.upload_dir.clone(),
    });
    let app = server::router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "facescand ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("facescand shutting down");
    Ok(())
}
