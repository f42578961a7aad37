mod config;
mod db;
mod frame;
mod routes;
mod services;
mod shape;
mod state;

use std::sync::Arc;

use config::{ConfigError, ServerConfig};
use services::identity::JwtVerifier;
use services::persistence::PgShapeStore;
use services::queue;

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("database init failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "drawsync failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = ServerConfig::from_env()?;

    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;
    let state = state::AppState::new(
        Arc::new(PgShapeStore::new(pool, config.engine.persist_timeout)),
        Arc::new(JwtVerifier::new(config.jwt_secret.as_bytes())),
        config.engine,
    );

    // Single consumer for the shape queue, plus the backstop that wakes it.
    let _drain = queue::spawn_drain_worker(state.clone());
    let _sweeper = queue::spawn_liveness_sweeper(state.queue.clone(), config.engine.sweep_interval);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    tracing::info!(port = config.port, "drawsync listening");
    axum::serve(listener, app).await?;
    Ok(())
}
