//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request id flows through the access log of every request
//! - Metrics go through the `metrics` facade; without an installed recorder
//!   every update is a no-op, which keeps tests quiet

pub mod logging;
pub mod metrics;
