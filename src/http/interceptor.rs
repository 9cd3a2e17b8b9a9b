//! Response interception.
//!
//! # Responsibilities
//! - Observe every backend response before it reaches the client
//! - Link new queries to the backend that accepted them
//! - Unlink queries once a poll reports them finished
//!
//! # Design Decisions
//! - Bodies are peeked and restored as a byte buffer; the client receives
//!   exactly the bytes the backend sent
//! - Only the statement resource is inspected; everything else passes through

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Method, Response, StatusCode},
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::http::protocol::{self, ProtocolError};
use crate::observability::metrics;
use crate::session::{QueryIdentity, SessionError, SessionStore};

/// Largest response body that will be buffered for inspection.
pub const MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

/// The parts of the forwarded request an interceptor may look at.
#[derive(Debug, Clone)]
pub struct ForwardedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
}

#[derive(Debug, Error)]
pub enum InterceptError {
    #[error("failed to buffer response body: {0}")]
    Body(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Hook run on every backend response.
#[async_trait]
pub trait Interceptor: Send + Sync + fmt::Debug {
    async fn intercept(
        &self,
        request: &ForwardedRequest,
        response: Response<Body>,
    ) -> Result<Response<Body>, InterceptError>;
}

/// Read the whole body and hand back an equivalent response.
pub async fn peek_body(response: Response<Body>, limit: usize) -> Result<(Response<Body>, Bytes), InterceptError> {
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| InterceptError::Body(e.to_string()))?;
    Ok((Response::from_parts(parts, Body::from(bytes.clone())), bytes))
}

/// Maintains query-to-backend session links for one backend.
#[derive(Debug, Clone)]
pub struct QueryLinker {
    sessions: Arc<dyn SessionStore>,
    coordinator: String,
}

impl QueryLinker {
    pub fn new(sessions: Arc<dyn SessionStore>, coordinator: impl Into<String>) -> Self {
        Self {
            sessions,
            coordinator: coordinator.into(),
        }
    }

    async fn link_submission(
        &self,
        request: &ForwardedRequest,
        response: Response<Body>,
    ) -> Result<Response<Body>, InterceptError> {
        let (response, body) = peek_body(response, MAX_BODY_SIZE).await?;
        let state = protocol::parse_query_state(&body)?;

        let query = QueryIdentity::new(
            protocol::user(&request.headers),
            state.id,
            protocol::transaction_id(&request.headers),
        );
        self.sessions.link(&query, &self.coordinator).await?;
        metrics::record_session_op("link");

        tracing::debug!(query = %query, backend = %self.coordinator, "Linked query to backend");
        Ok(response)
    }

    async fn unlink_finished(
        &self,
        request: &ForwardedRequest,
        response: Response<Body>,
    ) -> Result<Response<Body>, InterceptError> {
        let (response, body) = peek_body(response, MAX_BODY_SIZE).await?;
        let state = protocol::parse_query_state(&body)?;
        if !state.is_finished() {
            return Ok(response);
        }

        let query_id = if state.id.is_empty() {
            protocol::query_id_from_path(&request.path)?.to_string()
        } else {
            state.id
        };
        let query = QueryIdentity::new(
            protocol::user(&request.headers),
            query_id,
            protocol::transaction_id(&request.headers),
        );
        self.sessions.unlink(&query).await?;
        metrics::record_session_op("unlink");

        tracing::debug!(query = %query, backend = %self.coordinator, "Query finished, removed link");
        Ok(response)
    }
}

#[async_trait]
impl Interceptor for QueryLinker {
    async fn intercept(
        &self,
        request: &ForwardedRequest,
        response: Response<Body>,
    ) -> Result<Response<Body>, InterceptError> {
        if !protocol::is_statement_path(&request.path) {
            return Ok(response);
        }

        match request.method {
            Method::POST if response.status() == StatusCode::OK => {
                self.link_submission(request, response).await
            }
            Method::GET if response.status().is_success() => self.unlink_finished(request, response).await,
            _ => Ok(response),
        }
    }
}
