//! Query protocol conventions.
//!
//! # Responsibilities
//! - Classify requests (pass-through, query submission, continuation)
//! - Extract the query identity from request headers and path
//! - Parse query state from response bodies, gzip-compressed or not
//!
//! # Design Decisions
//! - Gzip is detected by magic bytes, not by `Content-Encoding`
//! - Unknown fields in query state documents are ignored

use axum::http::{HeaderMap, Method};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::io::Read;
use thiserror::Error;

use crate::session::QueryIdentity;

/// Path prefix of the stateful statement resource.
pub const STATEMENT_PATH: &str = "/v1/statement";
pub const HEADER_USER: &str = "x-trino-user";
pub const HEADER_TRANSACTION: &str = "x-trino-transaction-id";
/// Older clients still send the Presto header names.
pub const LEGACY_HEADER_USER: &str = "x-presto-user";
pub const LEGACY_HEADER_TRANSACTION: &str = "x-presto-transaction-id";
/// Terminal query state.
pub const STATE_FINISHED: &str = "FINISHED";

const GZIP_MAGIC: [u8; 2] = [31, 139];

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid statement path: {0}")]
    InvalidPath(String),

    #[error("failed to decompress response body: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("failed to parse query state: {0}")]
    Json(#[from] serde_json::Error),
}

/// How the dispatcher treats a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Anything outside the statement resource.
    Passthrough,
    /// A new query submission (`POST` on the statement path).
    Submission,
    /// A poll or cancellation of a running query, routed by affinity.
    Continuation,
}

pub fn is_statement_path(path: &str) -> bool {
    path.starts_with(STATEMENT_PATH)
}

pub fn classify(method: &Method, path: &str) -> RequestKind {
    if !is_statement_path(path) {
        return RequestKind::Passthrough;
    }

    match *method {
        Method::POST => RequestKind::Submission,
        Method::GET | Method::HEAD | Method::DELETE => RequestKind::Continuation,
        _ => RequestKind::Passthrough,
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str, legacy: &str) -> Option<&'a str> {
    headers
        .get(name)
        .or_else(|| headers.get(legacy))
        .and_then(|v| v.to_str().ok())
}

/// Requesting user, empty when the client sent none.
pub fn user(headers: &HeaderMap) -> String {
    header(headers, HEADER_USER, LEGACY_HEADER_USER)
        .unwrap_or_default()
        .to_string()
}

pub fn transaction_id(headers: &HeaderMap) -> Option<&str> {
    header(headers, HEADER_TRANSACTION, LEGACY_HEADER_TRANSACTION)
}

/// Query id carried by a continuation path.
///
/// `/v1/statement/{id}/...` or `/v1/statement/{queued|executing}/{id}/...`.
pub fn query_id_from_path(path: &str) -> Result<&str, ProtocolError> {
    let segments: Vec<&str> = path.split('/').collect();

    let id = match segments.get(3) {
        Some(&"queued") | Some(&"executing") => segments.get(4),
        other => other,
    };

    match id {
        Some(id) if !id.is_empty() => Ok(*id),
        _ => Err(ProtocolError::InvalidPath(path.to_string())),
    }
}

/// Identity of the query a continuation request refers to.
pub fn identity_from_request(headers: &HeaderMap, path: &str) -> Result<QueryIdentity, ProtocolError> {
    let query_id = query_id_from_path(path)?;
    Ok(QueryIdentity::new(user(headers), query_id, transaction_id(headers)))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryStats {
    pub state: String,
}

/// The fields of a query results document the proxy cares about.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryState {
    pub id: String,
    pub next_uri: Option<String>,
    pub stats: QueryStats,
}

impl QueryState {
    /// No continuation left and the query finished.
    pub fn is_finished(&self) -> bool {
        self.next_uri.is_none() && self.stats.state == STATE_FINISHED
    }
}

pub fn is_gzip(body: &[u8]) -> bool {
    body.len() >= 2 && body[..2] == GZIP_MAGIC
}

/// Parse a query state document, decompressing it first when gzip-encoded.
pub fn parse_query_state(body: &[u8]) -> Result<QueryState, ProtocolError> {
    if is_gzip(body) {
        let mut decoded = Vec::new();
        GzDecoder::new(body).read_to_end(&mut decoded)?;
        return Ok(serde_json::from_slice(&decoded)?);
    }
    Ok(serde_json::from_slice(body)?)
}
