//! Configuration schema definitions.
//!
//! All sections default, so an empty file (or no file) is a valid
//! single-node configuration with no coordinators.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use crate::load_balancer::{Coordinator, SelectionRule};
use crate::routing::NoMatchBehaviour;
use crate::session::redis::DEFAULT_PREFIX;

/// Root configuration for the balancer.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    pub listener: ListenerConfig,
    pub timeouts: TimeoutConfig,
    pub pool: PoolConfig,
    pub health_check: HealthCheckConfig,
    pub statistics: StatisticsConfig,
    pub routing: RoutingConfig,
    pub session: SessionConfig,
    pub discovery: DiscoveryConfig,
    pub rewrite: RewriteConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout enforced on inbound requests.
    pub request_secs: u64,

    /// TCP connect timeout towards coordinators.
    pub connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 300,
            connect_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    pub health_check_interval_secs: u64,
    pub statistics_interval_secs: u64,
    /// Period of the discovery reconciliation loop.
    pub sync_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 10,
            statistics_interval_secs: 10,
            sync_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckKind {
    #[default]
    Http,
    Noop,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// When disabled every coordinator is reported healthy.
    pub enabled: bool,
    pub kind: HealthCheckKind,
    pub path: String,
    pub timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: HealthCheckKind::Http,
            path: "/v1/status".to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// When disabled statistics stay zeroed.
    pub enabled: bool,
    pub path: String,
    pub timeout_secs: u64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/ui/api/stats".to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RoutingConfig {
    pub rule: SelectionRule,
    pub users: UsersConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UsersConfig {
    pub default: DefaultUsersConfig,
    /// Evaluated in order; the first matching user pattern wins.
    pub rules: Vec<UserRuleConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DefaultUsersConfig {
    pub behaviour: NoMatchBehaviour,
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRuleConfig {
    /// Regex matched against the requesting user.
    pub user: String,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClusterConfig {
    /// Regex matched against coordinator names.
    pub name: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStoreKind {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SessionConfig {
    pub store: SessionStoreKind,
    pub redis: RedisConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    /// `host:port` of the redis server.
    pub address: String,
    pub db: u32,
    pub password: Option<String>,
    pub prefix: String,
    /// Expiration of every link.
    pub ttl_secs: u64,
    pub timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:6379".to_string(),
            db: 0,
            password: None,
            prefix: DEFAULT_PREFIX.to_string(),
            ttl_secs: 24 * 60 * 60,
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DiscoveryConfig {
    #[serde(rename = "static")]
    pub static_list: Vec<CoordinatorConfig>,
}

/// One statically configured coordinator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoordinatorConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl CoordinatorConfig {
    pub fn to_coordinator(&self) -> Result<Coordinator, url::ParseError> {
        let mut coordinator = Coordinator::new(self.name.clone(), Url::parse(&self.url)?);
        coordinator.tags = self.tags.clone();
        coordinator.enabled = self.enabled;
        Ok(coordinator)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RewriteConfig {
    /// Headers set on routed requests that do not carry them.
    pub default_headers: Vec<HeaderConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeaderConfig {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
