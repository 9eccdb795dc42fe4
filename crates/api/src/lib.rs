//! `api` crate — HTTP REST and WebSocket layer.
//!
//! Exposes:
//!   GET    /api/v1/health
//!   GET    /api/v1/agents
//!   POST   /api/v1/agents/execute
//!   GET    /api/v1/templates
//!   GET    /api/v1/workflows
//!   POST   /api/v1/workflows
//!   GET    /api/v1/workflows/:id
//!   PUT    /api/v1/workflows/:id
//!   DELETE /api/v1/workflows/:id
//!   POST   /api/v1/workflows/:id/execute
//!   GET    /api/v1/workflows/:id/executions
//!   GET    /api/v1/executions/:id
//!   POST   /api/v1/executions/:id/cancel
//!   GET    /api/v1/ws

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use agents::{AgentCatalog, AgentExecutor};
use engine::{WorkflowRunner, WorkflowStore};

mod error;
pub mod handlers;

pub use error::ApiError;

#[cfg(test)]
mod routes_tests;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<WorkflowRunner>,
    pub store: Arc<dyn WorkflowStore>,
    pub executor: Arc<dyn AgentExecutor>,
    pub catalog: Arc<AgentCatalog>,
}

impl AppState {
    /// The store is taken from the runner so both always agree.
    pub fn new(
        runner: Arc<WorkflowRunner>,
        executor: Arc<dyn AgentExecutor>,
        catalog: AgentCatalog,
    ) -> Self {
        Self {
            store: Arc::clone(runner.store()),
            runner,
            executor,
            catalog: Arc::new(catalog),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/agents", get(handlers::agents::list))
        .route("/agents/execute", post(handlers::agents::execute))
        .route("/templates", get(handlers::workflows::templates))
        .route(
            "/workflows",
            get(handlers::workflows::list).post(handlers::workflows::create),
        )
        .route(
            "/workflows/:id",
            get(handlers::workflows::get)
                .put(handlers::workflows::update)
                .delete(handlers::workflows::delete),
        )
        .route("/workflows/:id/execute", post(handlers::executions::execute))
        .route("/workflows/:id/executions", get(handlers::executions::history))
        .route("/executions/:id", get(handlers::executions::get))
        .route("/executions/:id/cancel", post(handlers::executions::cancel))
        .route("/ws", get(handlers::ws::subscribe));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
