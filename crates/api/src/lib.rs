//! `api` crate — thin HTTP layer over the engine's pipeline entry points.
//!
//! Exposes:
//!   POST /api/v1/execute
//!   POST /api/v1/execute-single-node
//!   POST /api/v1/execute-single-branch
//!
//! Grounded in the teacher's `api` crate (axum + tower-http layering, the
//! `serve(bind) -> Result<(), io::Error>` shape) but re-pointed at
//! `engine::pipeline`'s entry points instead of the teacher's workflow-CRUD
//! surface, since those entry points are exactly the re-entry hooks §2
//! describes for fan-out workers and external orchestrators. The teacher's
//! workflow CRUD needed a database-backed workflow store this transformed
//! crate does not carry; see DESIGN.md's trim log.

pub mod handlers;

use axum::{routing::post, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub async fn serve(bind: &str) -> Result<(), std::io::Error> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_router = Router::new()
        .route("/execute", post(handlers::pipeline::execute))
        .route("/execute-single-node", post(handlers::pipeline::execute_single_node))
        .route("/execute-single-branch", post(handlers::pipeline::execute_single_branch));

    let app = Router::new()
        .nest("/api/v1", api_router)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await
}
