//! HTTP server wiring
//!
//! Builds the router over shared [`AppState`], applies the CORS and request
//! tracing layers, and serves until the shutdown future resolves.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::metrics;
use crate::storage::ControlRepository;

use super::api::create_router;
use super::engine::RotationEngine;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Typed storage access for admin routes
    pub repo: ControlRepository,

    /// Selection engine
    pub engine: Arc<RotationEngine>,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(repo: ControlRepository, engine: Arc<RotationEngine>) -> Self {
        Self {
            repo,
            engine,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// Server
// ============================================================================

async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request.uri().path().to_string();
    let start = Instant::now();
    let response = next.run(request).await;
    metrics::record_api_request(
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

/// HTTP front of the engine
pub struct RotorServer {
    config: ServerConfig,
    state: AppState,
}

impl RotorServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes and layers
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone())
            .layer(axum::middleware::from_fn(track_requests));

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Serve until `shutdown_signal` resolves
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let addr = self.config.bind_address;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("{addr}: {e}")))?;

        tracing::info!(%addr, "HTTP server listening");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| ServerError::ServeError(e.to_string()))?;

        tracing::info!("HTTP server shutdown complete");
        Ok(())
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Clone)]
pub enum ServerError {
    /// Failed to bind to address
    BindError(String),

    /// Server error
    ServeError(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BindError(msg) => write!(f, "Failed to bind: {}", msg),
            Self::ServeError(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {}

// ============================================================================
// Tests
// ============================================================================
