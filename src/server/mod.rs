//! HTTP server exposing the relay as an OpenAI-compatible API
//!
//! - POST /v1/chat/completions - streaming (SSE) or aggregated completion
//! - GET /v1/models - the single relay model
//! - GET /health - liveness

mod handlers;
pub mod types;

use anyhow::Result;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Settings;
use crate::pipeline::DeepClaude;

// ============================================================================
// Server State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub relay: DeepClaude,
    pub settings: Settings,
}

impl AppState {
    pub fn new(relay: DeepClaude, settings: Settings) -> Self {
        Self { relay, settings }
    }
}

// ============================================================================
// Routes
// ============================================================================

fn cors_layer(allow_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let origins: Vec<HeaderValue> = allow_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "skipping invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.allow_origins);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/v1/models", get(handlers::models_handler))
        .route(
            "/v1/chat/completions",
            post(handlers::chat_completions_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(settings: Settings) -> Result<()> {
    let addr = settings.bind_addr();
    let state = AppState::new(DeepClaude::from_settings(&settings), settings);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
