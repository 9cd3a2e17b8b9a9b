//! Backend health state.
//!
//! # States
//! - Unknown: never probed
//! - Unhealthy: excluded from routing
//! - Healthy: eligible for routing
//!
//! The ordering is meaningful: `Unknown < Unhealthy < Healthy`. Pool filters
//! express "at least healthy" as an ordinal comparison.

use serde::Serialize;
use std::fmt;
use std::time::SystemTime;

/// Ordinal health verdict of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Unhealthy,
    Healthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Healthy => "healthy",
        };
        f.write_str(s)
    }
}

/// Result of one health probe.
#[derive(Debug, Clone, PartialEq)]
pub struct Health {
    pub status: HealthStatus,
    pub message: String,
    pub timestamp: SystemTime,
}

impl Health {
    pub fn unknown() -> Self {
        Self::with_status(HealthStatus::Unknown, "not checked yet")
    }

    pub fn healthy(message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Healthy, message)
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Unhealthy, message)
    }

    fn with_status(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// True only for an explicit healthy verdict.
    pub fn is_available(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::unknown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering() {
        assert!(HealthStatus::Unknown < HealthStatus::Unhealthy);
        assert!(HealthStatus::Unhealthy < HealthStatus::Healthy);
    }

    #[test]
    fn test_availability() {
        assert!(Health::healthy("ok").is_available());
        assert!(!Health::unhealthy("down").is_available());
        assert!(!Health::default().is_available());
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
    }
}
