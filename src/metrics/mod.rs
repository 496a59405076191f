//! Metrics for the join agent
//!
//! Prometheus counters and histograms for joins, password lookups and client
//! polling. Rendered by the control server on `/metrics`.

pub mod collector;

pub use collector::{
    ClientMetrics, JoinMetrics, MetricsCollector, MetricsTimer, ResolverMetrics, ServiceMetrics,
};
