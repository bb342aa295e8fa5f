//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all endpoint handlers
//! - Wire up middleware (tracing, timeout, session auth)
//! - Bind the server to a listener and serve with graceful shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::http::{auth, handlers};
use crate::session::SessionManager;
use crate::transaction::TransactionManager;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<TransactionManager>,
    pub sessions: Arc<SessionManager>,
}

/// HTTP server for the configuration daemon.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server over the given state.
    pub fn new(state: AppState, request_timeout: Duration) -> Self {
        Self {
            router: build_router(state, request_timeout),
        }
    }

    /// The assembled router; used directly by integration tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router. Session-scoped endpoints sit behind the
/// bearer-token middleware; reads and session creation stay open.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let protected = Router::new()
        .route("/session/token", delete(handlers::end_session))
        .route("/config/running/update", post(handlers::update_running))
        .route(
            "/config/candidate",
            get(handlers::get_candidate)
                .put(handlers::apply_candidate)
                .delete(handlers::cancel_candidate),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_auth_middleware,
        ));

    let public = Router::new()
        .route("/session/token", post(handlers::create_session))
        .route("/config/running", get(handlers::get_running))
        .route("/config/running/diff", post(handlers::diff_running))
        .route("/config/schema", get(handlers::get_schema));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
