//! Proxy dispatcher.
//!
//! # Responsibilities
//! - Classify each inbound request (routed or affinity)
//! - Routed: rewrite, fetch healthy candidates, route, resolve by name
//! - Affinity: parse the query identity, look up its link, resolve by name,
//!   reconciling once when the pool does not know the linked backend
//! - Forward through the pool and map failures onto HTTP statuses
//!
//! # Design Decisions
//! - "No backend" is a 503, distinct from a failing backend (502)
//! - Two members answering to one name is a 500, never a coin toss
//! - Affinity requests skip rewriting and health filtering: a running query
//!   can only be served by the coordinator that owns it

use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::http::protocol::{self, ProtocolError, RequestKind};
use crate::http::request::request_id;
use crate::http::rewrite::{RequestRewriter, RewriteChain, RewriteError};
use crate::lifecycle::Shutdown;
use crate::load_balancer::sync::SyncError;
use crate::load_balancer::{ConnectionId, FetchRequest, Pool, PoolError, PoolSync};
use crate::observability::metrics;
use crate::routing::{Candidate, Router, RoutingError, RoutingRequest};
use crate::session::{QueryIdentity, SessionError, SessionStore};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no backend available")]
    NoBackendsAvailable,

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("more than one backend registered as {0}")]
    RegistryInvariant(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    InvalidQueryPath(#[from] ProtocolError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Forward(#[from] PoolError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoBackendsAvailable => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Routing(RoutingError::Forbidden(_)) => StatusCode::FORBIDDEN,
            ProxyError::Routing(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::RegistryInvariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Session(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ProxyError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Sync(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::InvalidQueryPath(_) => StatusCode::BAD_REQUEST,
            ProxyError::Rewrite(_) => StatusCode::BAD_REQUEST,
            // The member left the pool between resolution and forwarding.
            ProxyError::Forward(PoolError::NotFound(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Forward(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Routes every inbound request to one pooled coordinator.
#[derive(Debug)]
pub struct QueryProxy {
    pool: Arc<Pool>,
    sessions: Arc<dyn SessionStore>,
    router: Router,
    sync: Arc<PoolSync>,
    rewriter: RewriteChain,
    sync_interval: Duration,
    stop: Shutdown,
}

impl QueryProxy {
    pub fn new(
        pool: Arc<Pool>,
        sessions: Arc<dyn SessionStore>,
        router: Router,
        sync: Arc<PoolSync>,
        rewriter: RewriteChain,
        sync_interval: Duration,
    ) -> Self {
        Self {
            pool,
            sessions,
            router,
            sync,
            rewriter,
            sync_interval,
            stop: Shutdown::new(),
        }
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    /// Reconcile once, then keep reconciling in the background until
    /// [`close`](Self::close).
    pub async fn init(&self) -> Result<(), ProxyError> {
        let report = self.sync.sync(&self.pool).await?;
        tracing::info!(added = report.added, pool_size = self.pool.len(), "Initial pool reconciliation done");

        tokio::spawn(
            self.sync
                .clone()
                .run(self.pool.clone(), self.sync_interval, self.stop.subscribe()),
        );
        Ok(())
    }

    /// Stop reconciliation and every backend refresh loop.
    pub fn close(&self) {
        self.stop.trigger();
        self.pool.shutdown();
    }

    /// Connection id of the member called `name`, if any.
    fn resolve(&self, name: &str) -> Result<Option<ConnectionId>, ProxyError> {
        let found = self.pool.fetch(&FetchRequest::by_name(name));
        match found.as_slice() {
            [] => Ok(None),
            [member] => Ok(Some(member.id)),
            _ => {
                tracing::error!(backend = %name, matches = found.len(), "Backend name resolves to several pool members");
                Err(ProxyError::RegistryInvariant(name.to_string()))
            }
        }
    }

    fn route(&self, request: Request<Body>) -> Result<(String, Request<Body>, ConnectionId), ProxyError> {
        let request = if self.rewriter.is_empty() {
            request
        } else {
            self.rewriter.rewrite(request)?
        };

        let candidates = self
            .pool
            .fetch(&FetchRequest::routable())
            .into_iter()
            .map(|member| Candidate {
                coordinator: member.coordinator,
                statistics: member.statistics,
            })
            .collect();

        let user = protocol::user(request.headers());
        let coordinator = self.router.route(RoutingRequest { user, candidates }).map_err(|e| match e {
            RoutingError::NoCandidates => ProxyError::NoBackendsAvailable,
            other => ProxyError::Routing(other),
        })?;

        let id = self
            .resolve(&coordinator.name)?
            .ok_or(ProxyError::NoBackendsAvailable)?;
        Ok((coordinator.name, request, id))
    }

    async fn follow(&self, query: QueryIdentity) -> Result<(String, ConnectionId), ProxyError> {
        let name = self.sessions.get(&query).await?;

        if let Some(id) = self.resolve(&name)? {
            return Ok((name, id));
        }

        tracing::info!(backend = %name, query = %query, "Linked backend not in pool, reconciling");
        self.sync.sync(&self.pool).await?;
        match self.resolve(&name)? {
            Some(id) => Ok((name, id)),
            None => Err(ProxyError::NoBackendsAvailable),
        }
    }

    /// Pick a backend and forward. Returns the backend name with the response.
    pub async fn dispatch(&self, request: Request<Body>) -> Result<(String, Response<Body>), ProxyError> {
        let kind = protocol::classify(request.method(), request.uri().path());

        let (name, request, id) = match kind {
            RequestKind::Continuation => {
                let query = protocol::identity_from_request(request.headers(), request.uri().path())?;
                let (name, id) = self.follow(query).await?;
                (name, request, id)
            }
            RequestKind::Submission | RequestKind::Passthrough => self.route(request)?,
        };

        let response = self.pool.handle(id, request).await?;
        Ok((name, response))
    }

    /// Dispatch and turn failures into responses, recording metrics.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let request_id = request_id(&request);
        let method = request.method().to_string();
        let path = request.uri().path().to_string();

        tracing::debug!(request_id = %request_id, method = %method, path = %path, "Proxying request");

        match self.dispatch(request).await {
            Ok((backend, response)) => {
                metrics::record_request(&method, response.status().as_u16(), &backend, start);
                response
            }
            Err(e) => {
                let status = e.status();
                if status.is_server_error() {
                    tracing::warn!(request_id = %request_id, path = %path, status = %status, error = %e, "Request failed");
                } else {
                    tracing::debug!(request_id = %request_id, path = %path, status = %status, error = %e, "Request rejected");
                }
                metrics::record_request(&method, status.as_u16(), "none", start);
                e.into_response()
            }
        }
    }
}
