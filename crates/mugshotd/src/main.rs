use actix_web::{web::Data, App, HttpServer};
use anyhow::{Context, Result};
use mugshot_core::ArtifactStore;
use tracing_subscriber::EnvFilter;

mod cache;
mod config;
mod engine;
mod http;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("mugshotd starting");

    let config = config::Config::from_env()?;

    // Models and blocking HTTP clients are built before any async runtime exists.
    let worker = engine::MemeWorker::from_config(&config)?;
    let engine = engine::spawn_engine(worker)?;

    let state = Data::new(http::AppState {
        engine,
        store: ArtifactStore::open(&config.output_dir)?,
    });

    let bind_addr = config.bind_addr.clone();
    tracing::info!(addr = %bind_addr, "mugshotd ready");

    actix_web::rt::System::new()
        .block_on(async move {
            HttpServer::new(move || App::new().app_data(state.clone()).configure(http::configure))
                .bind(&bind_addr)?
                .run()
                .await
        })
        .with_context(|| format!("http server on {}", config.bind_addr))?;

    tracing::info!("mugshotd shutting down");
    Ok(())
}
