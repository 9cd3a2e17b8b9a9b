//! Request rewriting before routing.
//!
//! Rewriters run in order on routed requests (pass-through and submissions),
//! never on continuations, which must reach their backend unchanged.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
};
use std::fmt;
use thiserror::Error;

use crate::config::HeaderConfig;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("invalid header name {0:?}")]
    HeaderName(String),

    #[error("invalid value for header {0}")]
    HeaderValue(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

pub trait RequestRewriter: Send + Sync + fmt::Debug {
    fn rewrite(&self, request: Request<Body>) -> Result<Request<Body>, RewriteError>;
}

/// Applies each rewriter in order; the first failure stops the chain.
#[derive(Debug, Default)]
pub struct RewriteChain {
    rewriters: Vec<Box<dyn RequestRewriter>>,
}

impl RewriteChain {
    pub fn new(rewriters: Vec<Box<dyn RequestRewriter>>) -> Self {
        Self { rewriters }
    }

    pub fn is_empty(&self) -> bool {
        self.rewriters.is_empty()
    }
}

impl RequestRewriter for RewriteChain {
    fn rewrite(&self, request: Request<Body>) -> Result<Request<Body>, RewriteError> {
        self.rewriters
            .iter()
            .try_fold(request, |request, rewriter| rewriter.rewrite(request))
    }
}

/// Sets headers the client did not send.
#[derive(Debug, Clone, Default)]
pub struct DefaultHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl DefaultHeaders {
    pub fn from_config(headers: &[HeaderConfig]) -> Result<Self, RewriteError> {
        let headers = headers
            .iter()
            .map(|h| {
                let name = HeaderName::from_bytes(h.name.as_bytes())
                    .map_err(|_| RewriteError::HeaderName(h.name.clone()))?;
                let value = HeaderValue::from_str(&h.value)
                    .map_err(|_| RewriteError::HeaderValue(h.name.clone()))?;
                Ok((name, value))
            })
            .collect::<Result<Vec<_>, RewriteError>>()?;

        Ok(Self { headers })
    }
}

impl RequestRewriter for DefaultHeaders {
    fn rewrite(&self, mut request: Request<Body>) -> Result<Request<Body>, RewriteError> {
        let headers = request.headers_mut();
        for (name, value) in &self.headers {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        Ok(request)
    }
}

/// Build the rewrite chain from configuration.
pub fn from_config(config: &crate::config::RewriteConfig) -> Result<RewriteChain, RewriteError> {
    let mut rewriters: Vec<Box<dyn RequestRewriter>> = Vec::new();
    if !config.default_headers.is_empty() {
        rewriters.push(Box::new(DefaultHeaders::from_config(&config.default_headers)?));
    }
    Ok(RewriteChain::new(rewriters))
}
