//! Operator HTTP surface: read-only status plus manual stage triggers

mod handlers;
mod responses;
mod routes;

pub use routes::*;

use anyhow::Result;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::ApiConfig;
use crate::services::Orchestrator;

/// Shared API state
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Start the operator API server
pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    config: &ApiConfig,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = create_app(orchestrator, config.enable_cors);

    let listener = TcpListener::bind(&config.bind_address).await?;
    info!("Operator API listening on {}", config.bind_address);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });
    Ok(handle)
}

fn create_app(orchestrator: Arc<Orchestrator>, enable_cors: bool) -> Router {
    let state = ApiState { orchestrator };

    let mut app = Router::new()
        .merge(create_status_routes())
        .merge(create_trigger_routes())
        .merge(create_admin_routes())
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().timestamp(),
        "service": "surge-keeper"
    }))
}
