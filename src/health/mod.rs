//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Pool connection health loop (one task per backend):
//!     Timer tick
//!     → active.rs (probe coordinator status endpoint)
//!     → state.rs (Health verdict)
//!     → stored under the connection's own state lock
//! ```
//!
//! # Design Decisions
//! - A checker error is never fatal: it degrades to an unhealthy verdict
//! - Health state is per-backend, not per-pool
//! - Status transitions are logged by the pool, not by the checker

pub mod active;
pub mod state;

pub use active::{HealthCheck, HealthCheckError, HttpHealthCheck, NoOpHealthCheck};
pub use state::{Health, HealthStatus};
