//! HTTP surface of the Sofia proxy.
//!
//! Endpoints:
//! - POST /api/claude - Claude API relay (the frontend's only LLM channel)
//! - GET /health - Health check
//!
//! The relay route is registered for every method so that non-POST requests
//! get the JSON 405 envelope; axum's automatic 405 would have an empty body,
//! which the frontend's generic error path cannot render. The body is taken
//! as raw bytes for the same reason: a `Json` extractor would turn malformed
//! JSON into a framework rejection instead of the relay's own 500 envelope.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::config::{Config, EnvCredentials};
use crate::error::ProxyError;
use crate::relay::RelayService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: RelayService,
}

impl AppState {
    /// Build state from configuration, reading the credential from the
    /// environment per request with the config-file key as fallback.
    pub fn from_config(config: &Config) -> Self {
        let credentials = EnvCredentials::new(config.api_keys.claude.clone());
        Self {
            relay: RelayService::new(&config.provider, Arc::new(credentials)),
        }
    }
}

/// Create the API router.
pub fn create_router(config: &Config) -> Router {
    create_router_with_state(AppState::from_config(config))
}

/// Create the API router with custom state.
pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/claude", any(claude_proxy))
        // The proxy exists so the browser never talks to the provider
        // directly; CORS stays permissive for the frontend origin.
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn claude_proxy(
    State(state): State<Arc<AppState>>,
    method: Method,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return ProxyError::MethodNotAllowed.into_response();
    }

    let request_id = Uuid::new_v4();
    let started = Instant::now();

    match state.relay.handle(&body).await {
        Ok(completion) => {
            tracing::info!(
                %request_id,
                status = 200,
                duration_ms = started.elapsed().as_millis() as u64,
                "relayed chat completion"
            );
            (
                StatusCode::OK,
                // Completions may reflect per-student content; never cached.
                [(
                    header::CACHE_CONTROL,
                    "no-cache, no-store, must-revalidate",
                )],
                Json(completion),
            )
                .into_response()
        }
        Err(err) => {
            tracing::warn!(
                %request_id,
                status = err.status_code().as_u16(),
                duration_ms = started.elapsed().as_millis() as u64,
                error = %err,
                "relay request failed"
            );
            err.into_response()
        }
    }
}
