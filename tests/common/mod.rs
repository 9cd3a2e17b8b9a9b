//! Shared utilities for integration tests: programmable mock coordinators
//! and a balancer serving on an ephemeral port.

#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use query_balancer::config::{CoordinatorConfig, HealthCheckKind, ProxyConfig};
use query_balancer::lifecycle::{build_proxy, Shutdown};
use query_balancer::{HttpServer, QueryProxy};

/// Polls up to this page number keep a query running; the next one finishes it.
pub const PAGES_BEFORE_FINISH: u32 = 2;

struct MockState {
    name: String,
    healthy: AtomicBool,
    running_queries: AtomicI32,
    submissions: AtomicUsize,
    polls: Mutex<Vec<String>>,
}

/// An axum server speaking just enough of the coordinator protocol.
pub struct MockCoordinator {
    pub name: String,
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockCoordinator {
    pub async fn start(name: &str) -> Self {
        let state = Arc::new(MockState {
            name: name.to_string(),
            healthy: AtomicBool::new(true),
            running_queries: AtomicI32::new(0),
            submissions: AtomicUsize::new(0),
            polls: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/status", get(status))
            .route("/ui/login", post(ui_login))
            .route("/ui/api/stats", get(stats))
            .route("/v1/info", get(info))
            .route("/v1/statement", post(submit))
            .route("/v1/statement/executing/{id}/{token}/{page}", get(poll))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            name: name.to_string(),
            addr,
            state,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_running_queries(&self, running: i32) {
        self.state.running_queries.store(running, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> usize {
        self.state.submissions.load(Ordering::SeqCst)
    }

    /// Query ids polled on this coordinator, in arrival order.
    pub fn polls(&self) -> Vec<String> {
        self.state.polls.lock().unwrap().clone()
    }

    pub fn config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            name: self.name.clone(),
            url: self.url(),
            tags: Default::default(),
            enabled: true,
        }
    }
}

fn next_uri(headers: &HeaderMap, id: &str, page: u32) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}/v1/statement/executing/{}/token/{}", host, id, page)
}

async fn status(State(state): State<Arc<MockState>>) -> StatusCode {
    if state.healthy.load(Ordering::SeqCst) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Session cookie handed out by the UI login.
const UI_COOKIE: &str = "Trino-UI-Token=mock";

async fn ui_login() -> (StatusCode, [(header::HeaderName, &'static str); 2]) {
    (
        StatusCode::SEE_OTHER,
        [(header::SET_COOKIE, "Trino-UI-Token=mock; Path=/"), (header::LOCATION, "/ui/")],
    )
}

async fn stats(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    let authorized = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == UI_COOKIE);
    if !authorized {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(Json(json!({
        "runningQueries": state.running_queries.load(Ordering::SeqCst),
        "activeWorkers": 1,
    })))
}

async fn info(State(state): State<Arc<MockState>>) -> Json<Value> {
    Json(json!({ "coordinator": state.name }))
}

async fn submit(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Json<Value> {
    let n = state.submissions.fetch_add(1, Ordering::SeqCst);
    let id = format!("{}-q{}", state.name, n);
    Json(json!({
        "id": id,
        "nextUri": next_uri(&headers, &id, 1),
        "stats": { "state": "QUEUED" },
    }))
}

async fn poll(
    State(state): State<Arc<MockState>>,
    Path((id, _token, page)): Path<(String, String, u32)>,
    headers: HeaderMap,
) -> Json<Value> {
    state.polls.lock().unwrap().push(id.clone());

    if page > PAGES_BEFORE_FINISH {
        Json(json!({ "id": id, "stats": { "state": "FINISHED" } }))
    } else {
        Json(json!({
            "id": id,
            "nextUri": next_uri(&headers, &id, page + 1),
            "stats": { "state": "RUNNING" },
        }))
    }
}

/// Configuration with HTTP health checks against `coordinators` and
/// background loops slow enough to stay out of the way.
pub fn config_for(coordinators: &[&MockCoordinator]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.health_check.kind = HealthCheckKind::Http;
    config.health_check.timeout_secs = 2;
    config.statistics.timeout_secs = 2;
    config.pool.health_check_interval_secs = 3600;
    config.pool.statistics_interval_secs = 3600;
    config.pool.sync_interval_secs = 3600;
    config.discovery.static_list = coordinators.iter().map(|c| c.config()).collect();
    config
}

/// A balancer serving on an ephemeral port.
pub struct TestProxy {
    pub base: String,
    pub proxy: Arc<QueryProxy>,
    shutdown: Shutdown,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestProxy {
    pub async fn start(config: ProxyConfig) -> Self {
        let proxy = build_proxy(&config).unwrap();
        proxy.init().await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let shutdown = Shutdown::new();
        let server = HttpServer::new(proxy.clone(), Duration::from_secs(10));
        let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

        Self {
            base,
            proxy,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.handle.await.unwrap().unwrap();
    }
}

/// Submit a query as `user` and return the response document.
pub async fn submit_query(client: &reqwest::Client, proxy: &TestProxy, user: &str) -> Value {
    let response = client
        .post(proxy.url("/v1/statement"))
        .header("x-trino-user", user)
        .body("SELECT 1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    response.json().await.unwrap()
}

/// Poll page `page` of query `id` through the balancer.
pub async fn poll_query(client: &reqwest::Client, proxy: &TestProxy, user: &str, id: &str, page: u32) -> reqwest::Response {
    client
        .get(proxy.url(&format!("/v1/statement/executing/{}/token/{}", id, page)))
        .header("x-trino-user", user)
        .send()
        .await
        .unwrap()
}
