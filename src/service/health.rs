//! Health checks for the join agent
//!
//! The agent is healthy while it runs and its status poller keeps producing
//! fresh snapshots. A missing local client only degrades it: the agent still
//! works, it just has nothing to join with.

use crate::service::control::ControlState;
use crate::types::GamePhase;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Value exported on the health gauge
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        if other.as_gauge() < self.as_gauge() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional explanation when not healthy
    pub message: Option<String>,
    pub duration_ms: u64,
}

/// What the agent currently sees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub client_present: bool,
    pub phase: Option<GamePhase>,
    /// State of the running join, if any
    pub join_state: Option<String>,
    pub last_poll: Option<chrono::DateTime<chrono::Utc>>,
}

impl HealthCheck {
    /// Full health check over all components
    pub async fn check(state: &ControlState) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(state).await,
            Self::check_status_poller(state),
            Self::check_local_client(state),
        ];

        let status = checks
            .iter()
            .map(|c| c.status.clone())
            .fold(HealthStatus::Healthy, HealthStatus::worst);

        Ok(HealthCheck {
            status,
            service: state.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats: Self::gather_stats(state),
        })
    }

    /// Simple liveness check - just verify the service is running
    pub async fn liveness_check(state: &ControlState) -> Result<HealthStatus> {
        if *state.is_running.read().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    async fn check_service_running(state: &ControlState) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if *state.is_running.read().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// The poller is stale once it misses three intervals
    fn check_status_poller(state: &ControlState) -> ComponentCheck {
        let start = Instant::now();
        let max_age = chrono::Duration::from_std(state.status_poll_interval * 3)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));

        let (status, message) = match state.latest_status.borrow().as_ref() {
            None => (
                HealthStatus::Degraded,
                Some("No status poll completed yet".to_string()),
            ),
            Some(snapshot) if chrono::Utc::now() - snapshot.observed_at > max_age => (
                HealthStatus::Degraded,
                Some(format!("Last status poll at {}", snapshot.observed_at)),
            ),
            Some(_) => (HealthStatus::Healthy, None),
        };

        ComponentCheck {
            name: "status_poller".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_local_client(state: &ControlState) -> ComponentCheck {
        let start = Instant::now();
        let present = state
            .latest_status
            .borrow()
            .as_ref()
            .map(|s| s.client_present)
            .unwrap_or(false);

        let (status, message) = if present {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Degraded,
                Some("Local client not running".to_string()),
            )
        };

        ComponentCheck {
            name: "local_client".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn gather_stats(state: &ControlState) -> ServiceStats {
        let latest = state.latest_status.borrow();
        ServiceStats {
            client_present: latest.as_ref().map(|s| s.client_present).unwrap_or(false),
            phase: latest.as_ref().map(|s| s.phase),
            join_state: state
                .orchestrator
                .in_flight_state()
                .map(|s| format!("{:?}", s)),
            last_poll: latest.as_ref().map(|s| s.observed_at),
        }
    }
}
