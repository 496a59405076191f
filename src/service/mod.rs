//! Service layer for the join agent
//!
//! Application state, the local control server, health checks and
//! background task management.

pub mod app;
pub mod control;
pub mod health;

pub use app::{spawn_status_poller, AppState, ServiceError};
pub use control::{ControlServer, ControlServerConfig, ControlState};
pub use health::{HealthCheck, HealthStatus};
