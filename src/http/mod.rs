//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! client
//!     → server.rs (axum router, request id, timeout, access log)
//!     → dispatcher.rs (classify, route or follow the session link)
//!         → rewrite.rs (routed requests only)
//!         → protocol.rs (statement paths, headers, query ids)
//!     → load_balancer::Pool::handle
//!         → forward.rs (per-backend reverse proxy)
//!         → interceptor.rs (link submissions, unlink finished queries)
//!     → client
//! ```

pub mod dispatcher;
pub mod forward;
pub mod interceptor;
pub mod protocol;
pub mod request;
pub mod rewrite;
pub mod server;

pub use dispatcher::{ProxyError, QueryProxy};
pub use request::X_REQUEST_ID;
pub use server::HttpServer;
