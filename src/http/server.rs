//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the axum router: `/health` plus a catch-all proxy handler
//! - Wire up middleware (tracing, timeout, request id)
//! - Serve until shutdown, then stop the proxy's background work

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::Response,
    routing::{any, get},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::http::dispatcher::QueryProxy;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<QueryProxy>,
}

/// HTTP front of the balancer.
pub struct HttpServer {
    router: Router,
    proxy: Arc<QueryProxy>,
}

impl HttpServer {
    pub fn new(proxy: Arc<QueryProxy>, request_timeout: Duration) -> Self {
        let state = AppState { proxy: proxy.clone() };
        let router = Self::build_router(state, request_timeout);
        Self { router, proxy }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState, request_timeout: Duration) -> Router {
        let routes = Router::new()
            .route("/health", get(health_handler))
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state);
        with_middleware(routes, request_timeout)
    }

    /// The configured router, for serving elsewhere.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await;

        self.proxy.close();
        tracing::info!("HTTP server stopped");
        result
    }
}

/// Timeout, request id and access log layers, outermost last.
fn with_middleware(router: Router, request_timeout: Duration) -> Router {
    router
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
        .layer(TraceLayer::new_for_http())
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}

/// Main proxy handler.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.proxy.handle(request).await
}
