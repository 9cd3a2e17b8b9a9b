//! Query-aware load balancer for Trino/Presto coordinators.
//!
//! New queries are routed across a pool of healthy coordinators; every
//! follow-up request of a query is pinned to the coordinator that accepted it.

// Core subsystems
pub mod config;
pub mod http;
pub mod routing;
pub mod session;

// Traffic management
pub mod discovery;
pub mod health;
pub mod load_balancer;
pub mod statistics;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use http::{HttpServer, QueryProxy};
pub use lifecycle::Shutdown;
