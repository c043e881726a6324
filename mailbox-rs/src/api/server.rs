//! API Server - HTTP server for REST API

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::{self, AppState};

/// Build the router with all routes
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let setup_routes = Router::new()
        .route("/status", get(handlers::setup_status))
        .route("/cloudflare", post(handlers::setup_cloudflare))
        .route(
            "/cloudflare/worker-routing",
            post(handlers::fix_worker_routing),
        )
        .route("/brevo", post(handlers::setup_brevo))
        .route("/complete", post(handlers::complete_setup));

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/inbound",
            post(handlers::inbound).layer(DefaultBodyLimit::max(state.max_message_size)),
        )
        .nest("/setup", setup_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// API Server configuration
pub struct ApiServer {
    state: Arc<AppState>,
    addr: String,
}

impl ApiServer {
    pub fn new(state: Arc<AppState>, addr: String) -> Self {
        Self { state, addr }
    }

    /// Start the API server
    pub async fn run(&self) -> std::io::Result<()> {
        let router = router(self.state.clone());

        info!("Starting API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
