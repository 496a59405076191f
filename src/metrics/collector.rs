//! Metrics collection using Prometheus
//!
//! Counters and histograms for join attempts, password lookups and client
//! polling. Everything is registered on one registry that the control server
//! renders on `/metrics`.

use crate::join::JoinReport;
use crate::resolver::ResolveOutcome;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the join agent
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    service_metrics: ServiceMetrics,
    join_metrics: JoinMetrics,
    client_metrics: ClientMetrics,
    resolver_metrics: ResolverMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,
}

/// Join attempt metrics
#[derive(Clone)]
pub struct JoinMetrics {
    /// Finished join requests by outcome label
    pub joins_total: IntCounterVec,

    /// Wall time of driven attempts
    pub join_duration_seconds: HistogramVec,

    /// States entered by driven attempts
    pub state_transitions_total: IntCounterVec,

    /// Local client actions issued per attempt
    pub actions_per_attempt: Histogram,

    /// 1 while a join is in flight
    pub join_in_flight: IntGauge,
}

/// Local client polling metrics
#[derive(Clone)]
pub struct ClientMetrics {
    /// Polls by result (present, absent, undecodable)
    pub probe_polls_total: IntCounterVec,

    /// Decoding problems reported by the probe
    pub probe_decode_errors_total: IntCounter,

    /// 1 when the last poll saw the client
    pub client_present: IntGauge,
}

/// Matching service metrics
#[derive(Clone)]
pub struct ResolverMetrics {
    /// Password lookups by outcome
    pub resolver_requests_total: IntCounterVec,

    /// Lookup latency including retries
    pub resolver_duration_seconds: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let join_metrics = JoinMetrics::new(&registry)?;
        let client_metrics = ClientMetrics::new(&registry)?;
        let resolver_metrics = ResolverMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            join_metrics,
            client_metrics,
            resolver_metrics,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn join(&self) -> &JoinMetrics {
        &self.join_metrics
    }

    pub fn client(&self) -> &ClientMetrics {
        &self.client_metrics
    }

    pub fn resolver(&self) -> &ResolverMetrics {
        &self.resolver_metrics
    }

    /// Record the outcome of one join request, driven or not
    pub fn record_join_outcome(&self, outcome: &str) {
        self.join_metrics
            .joins_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a finished driver run
    pub fn record_join_report(&self, report: &JoinReport, duration: Duration) {
        let status = if report.succeeded() { "succeeded" } else { "failed" };
        self.join_metrics
            .join_duration_seconds
            .with_label_values(&[status])
            .observe(duration.as_secs_f64());

        for state in report.history.iter().skip(1) {
            self.join_metrics
                .state_transitions_total
                .with_label_values(&[&format!("{:?}", state).to_lowercase()])
                .inc();
        }

        self.join_metrics
            .actions_per_attempt
            .observe(report.attempts_made as f64);
    }

    pub fn set_join_in_flight(&self, in_flight: bool) {
        self.join_metrics.join_in_flight.set(in_flight as i64);
    }

    /// Record one probe poll
    pub fn record_probe_poll(&self, present: bool, decode_errors: usize) {
        let result = match (present, decode_errors) {
            (false, _) => "absent",
            (true, 0) => "present",
            (true, _) => "undecodable",
        };

        self.client_metrics
            .probe_polls_total
            .with_label_values(&[result])
            .inc();
        self.client_metrics
            .probe_decode_errors_total
            .inc_by(decode_errors as u64);
        self.client_metrics.client_present.set(present as i64);
    }

    /// Record one password lookup
    pub fn record_resolve(&self, outcome: &ResolveOutcome, duration: Duration) {
        self.resolver_metrics
            .resolver_requests_total
            .with_label_values(&[outcome.as_label()])
            .inc();
        self.resolver_metrics
            .resolver_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("league_link_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "league_link_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
        })
    }
}

impl JoinMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let joins_total = IntCounterVec::new(
            Opts::new("league_link_joins_total", "Join requests by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(joins_total.clone()))?;

        let join_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "league_link_join_duration_seconds",
                "Duration of driven join attempts",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["status"],
        )?;
        registry.register(Box::new(join_duration_seconds.clone()))?;

        let state_transitions_total = IntCounterVec::new(
            Opts::new(
                "league_link_join_state_transitions_total",
                "Join driver states entered",
            ),
            &["state"],
        )?;
        registry.register(Box::new(state_transitions_total.clone()))?;

        let actions_per_attempt = Histogram::with_opts(
            HistogramOpts::new(
                "league_link_join_actions_per_attempt",
                "Local client actions issued per join attempt",
            )
            .buckets(vec![0.0, 1.0, 2.0, 3.0, 4.0, 6.0, 8.0]),
        )?;
        registry.register(Box::new(actions_per_attempt.clone()))?;

        let join_in_flight =
            IntGauge::new("league_link_join_in_flight", "Join attempt in progress")?;
        registry.register(Box::new(join_in_flight.clone()))?;

        Ok(Self {
            joins_total,
            join_duration_seconds,
            state_transitions_total,
            actions_per_attempt,
            join_in_flight,
        })
    }
}

impl ClientMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let probe_polls_total = IntCounterVec::new(
            Opts::new("league_link_probe_polls_total", "Local client polls"),
            &["result"],
        )?;
        registry.register(Box::new(probe_polls_total.clone()))?;

        let probe_decode_errors_total = IntCounter::new(
            "league_link_probe_decode_errors_total",
            "Undecodable local client responses",
        )?;
        registry.register(Box::new(probe_decode_errors_total.clone()))?;

        let client_present = IntGauge::new(
            "league_link_client_present",
            "Whether the local client was seen on the last poll",
        )?;
        registry.register(Box::new(client_present.clone()))?;

        Ok(Self {
            probe_polls_total,
            probe_decode_errors_total,
            client_present,
        })
    }
}

impl ResolverMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let resolver_requests_total = IntCounterVec::new(
            Opts::new(
                "league_link_resolver_requests_total",
                "Password lookups by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(resolver_requests_total.clone()))?;

        let resolver_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "league_link_resolver_duration_seconds",
                "Password lookup time including retries",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0]),
        )?;
        registry.register(Box::new(resolver_duration_seconds.clone()))?;

        Ok(Self {
            resolver_requests_total,
            resolver_duration_seconds,
        })
    }
}
