//! HTTP surface: `/get_doctors` and `/health`.

mod cors;
mod handlers;
pub mod worker_pool;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::{AppConfig, ServerSettings};
use crate::engine::Engine;
pub use worker_pool::{PoolError, WorkerPool};

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub pool: WorkerPool,
    pub settings: Arc<ServerSettings>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, settings: ServerSettings) -> Self {
        let pool = WorkerPool::new(settings.worker_pool_size, settings.request_timeout());
        Self {
            engine,
            pool,
            settings: Arc::new(settings),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/get_doctors", get(handlers::get_doctors_handler))
        .route("/health", get(handlers::health_handler))
        .layer(from_fn_with_state(state.clone(), cors::cors_middleware))
        .with_state(state)
}

/// Warm the caches, bind and serve until Ctrl-C.
pub async fn serve(config: AppConfig) -> Result<(), ServeError> {
    let engine = Arc::new(Engine::new(config.dataset.clone(), config.model.clone()));
    let warm = Arc::clone(&engine);
    if tokio::task::spawn_blocking(move || warm.initialize())
        .await
        .is_err()
    {
        warn!("Initialization task panicked; requests will retry loading");
    }

    let addr = config.server.bind_addr.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServeError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let state = AppState::new(engine, config.server);
    let pool = state.pool.clone();
    info!(
        workers = state.pool.size(),
        timeout_ms = state.pool.timeout().as_millis() as u64,
        "Listening on {addr}"
    );
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServeError::Serve)?;
    pool.close();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(err) => {
            error!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    }
}
