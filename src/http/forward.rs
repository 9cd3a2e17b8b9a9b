//! Per-backend reverse forwarding.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the backend address
//! - Strip hop-by-hop headers
//! - Forward over the shared HTTP client
//! - Run the response through the backend's interceptors
//!
//! # Design Decisions
//! - The client's `Host` header is preserved so coordinators build
//!   continuation URIs pointing back at the proxy
//! - No retries: resubmitting a query elsewhere could run it twice

use axum::{
    body::Body,
    http::{
        header,
        uri::{Authority, PathAndQuery, Scheme},
        HeaderMap, Request, Response, Uri,
    },
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::http::interceptor::{ForwardedRequest, InterceptError, Interceptor};

/// Shared outbound client.
pub type HttpClient = Client<HttpConnector, Body>;

pub fn build_client(connect_timeout: Duration) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid upstream uri: {0}")]
    Uri(String),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("response interception failed: {0}")]
    Intercept(#[from] InterceptError),
}

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    for name in &listed {
        headers.remove(name.as_str());
    }
}

/// Forwarding channel to one backend.
#[derive(Debug, Clone)]
pub struct ReverseProxy {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    client: HttpClient,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ReverseProxy {
    pub fn new(
        target: &Url,
        client: HttpClient,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Result<Self, ForwardError> {
        let host = target
            .host_str()
            .ok_or_else(|| ForwardError::Uri(format!("{} has no host", target)))?;
        let authority = match target.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let authority = Authority::from_str(&authority).map_err(|e| ForwardError::Uri(e.to_string()))?;
        let scheme = Scheme::from_str(target.scheme()).map_err(|e| ForwardError::Uri(e.to_string()))?;

        Ok(Self {
            scheme,
            authority,
            base_path: target.path().trim_end_matches('/').to_string(),
            client,
            interceptors,
        })
    }

    fn upstream_uri(&self, uri: &Uri) -> Result<Uri, ForwardError> {
        let path_and_query = uri.path_and_query().map(PathAndQuery::as_str).unwrap_or("/");
        let joined = format!("{}{}", self.base_path, path_and_query);

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(joined)
            .build()
            .map_err(|e| ForwardError::Uri(e.to_string()))
    }

    /// Forward one exchange and return the (intercepted) backend response.
    pub async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, ForwardError> {
        let (mut parts, body) = request.into_parts();

        let forwarded = ForwardedRequest {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            headers: parts.headers.clone(),
        };

        parts.uri = self.upstream_uri(&parts.uri)?;
        strip_hop_by_hop(&mut parts.headers);

        let upstream = self.client.request(Request::from_parts(parts, body)).await?;

        let (mut parts, body) = upstream.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        let mut response = Response::from_parts(parts, Body::new(body));

        for interceptor in &self.interceptors {
            response = interceptor.intercept(&forwarded, response).await?;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn proxy(target: &str) -> ReverseProxy {
        ReverseProxy::new(
            &Url::parse(target).unwrap(),
            build_client(Duration::from_secs(1)),
            Vec::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_upstream_uri() {
        let p = proxy("http://coordinator:8080");
        let uri: Uri = "/v1/statement/queued/q1/a/1?x=1".parse().unwrap();
        assert_eq!(
            p.upstream_uri(&uri).unwrap().to_string(),
            "http://coordinator:8080/v1/statement/queued/q1/a/1?x=1"
        );

        let p = proxy("http://coordinator/base/");
        let uri: Uri = "/v1/info".parse().unwrap();
        assert_eq!(p.upstream_uri(&uri).unwrap().to_string(), "http://coordinator/base/v1/info");
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-secret"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-secret", HeaderValue::from_static("1"));
        headers.insert("x-trino-user", HeaderValue::from_static("alice"));

        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("x-trino-user"));
    }
}
