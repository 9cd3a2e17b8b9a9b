//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → lifecycle::startup builds every subsystem from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; coordinator membership changes come
//!   from discovery, not from reloads
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ClusterConfig, CoordinatorConfig, DiscoveryConfig, HeaderConfig, HealthCheckConfig, HealthCheckKind,
    ListenerConfig, ObservabilityConfig, PoolConfig, ProxyConfig, RedisConfig, RewriteConfig, RoutingConfig,
    SessionConfig, SessionStoreKind, StatisticsConfig, TimeoutConfig, UserRuleConfig, UsersConfig,
};
pub use validation::{validate_config, ValidationError};
