//! Main application state and service coordination
//!
//! Wires the local client, matching service and registration into one
//! orchestrator, runs the background status poller and serves the control
//! endpoints until shutdown.

use crate::client::{LcuHttpClient, LocalClientApi};
use crate::config::AppConfig;
use crate::metrics::MetricsCollector;
use crate::orchestrator::JoinOrchestrator;
use crate::registration::{RegistrationSource, SettingsFileRegistration};
use crate::resolver::{HttpMatchResolver, MatchResolver};
use crate::service::control::{ControlServer, ControlServerConfig, ControlState};
use crate::service::health::HealthCheck;
use crate::types::StatusSnapshot;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,
    orchestrator: Arc<JoinOrchestrator>,
    metrics: Arc<MetricsCollector>,
    /// Latest snapshot from the status poller
    latest_status: Arc<watch::Sender<Option<StatusSnapshot>>>,
    control_server: Option<Arc<ControlServer>>,
    background_tasks: Vec<JoinHandle<()>>,
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Build every component from configuration
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing {} join agent", config.service.name);
        info!(
            "Configuration: lockfile={}, matching_service={}",
            config.client.lockfile_location().display(),
            config.resolver.base_url
        );

        let metrics = Arc::new(MetricsCollector::new().map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            }
        })?);

        let api: Arc<dyn LocalClientApi> = Arc::new(
            LcuHttpClient::new(
                config.client.lockfile_location(),
                config.client.action_timeout(),
            )
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to create local client: {}", e),
            })?,
        );

        let resolver: Arc<dyn MatchResolver> = Arc::new(
            HttpMatchResolver::new(&config.resolver).map_err(|e| ServiceError::Initialization {
                message: format!("Failed to create matching service client: {}", e),
            })?,
        );

        let registration: Arc<dyn RegistrationSource> = Arc::new(
            SettingsFileRegistration::from_settings(&config.registration, &config.resolver)
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create registration source: {}", e),
                })?,
        );

        let orchestrator = Arc::new(JoinOrchestrator::new(
            api,
            resolver,
            registration,
            &config,
            metrics.clone(),
        ));

        Ok(Self::from_parts(config, orchestrator, metrics))
    }

    /// Assemble from prebuilt components
    pub fn from_parts(
        config: AppConfig,
        orchestrator: Arc<JoinOrchestrator>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let (latest_status, _) = watch::channel(None);

        Self {
            config,
            orchestrator,
            metrics,
            latest_status: Arc::new(latest_status),
            control_server: None,
            background_tasks: Vec::new(),
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start the control server and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting {} join agent", self.config.service.name);

        *self.is_running.write().await = true;

        self.start_control_server().await?;
        self.start_background_tasks();

        info!("✅ Join agent started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of the join agent");

        *self.is_running.write().await = false;

        if self.orchestrator.cancel() {
            info!("Cancelled the running join");
        }

        if let Some(server) = self.control_server.take() {
            if let Err(e) = server.stop().await {
                warn!("Failed to stop control server: {}", e);
            }
        }

        self.stop_background_tasks().await;

        info!("✅ Join agent shutdown completed");
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn orchestrator(&self) -> Arc<JoinOrchestrator> {
        self.orchestrator.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Latest snapshot taken by the status poller
    pub fn latest_status(&self) -> Option<StatusSnapshot> {
        self.latest_status.borrow().clone()
    }

    /// Follow status poller snapshots
    pub fn subscribe_status(&self) -> watch::Receiver<Option<StatusSnapshot>> {
        self.latest_status.subscribe()
    }

    /// State shared with the control endpoints
    pub fn control_state(&self) -> ControlState {
        ControlState {
            orchestrator: self.orchestrator.clone(),
            metrics: self.metrics.clone(),
            latest_status: self.latest_status.subscribe(),
            is_running: self.is_running.clone(),
            service_name: self.config.service.name.clone(),
            status_poll_interval: self.config.status_poll_interval(),
        }
    }

    /// Run a full health check against the current state
    pub async fn health(&self) -> anyhow::Result<HealthCheck> {
        HealthCheck::check(&self.control_state()).await
    }

    async fn start_control_server(&mut self) -> Result<(), ServiceError> {
        let config = ControlServerConfig {
            host: self.config.service.control_host.clone(),
            port: self.config.service.control_port,
        };
        info!(
            "Starting control server on {}:{}",
            config.host, config.port
        );

        let server = Arc::new(ControlServer::new(config, self.control_state()));
        let task_server = server.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = task_server.start().await {
                error!("Control server failed: {}", e);
            } else {
                info!("Control server task completed");
            }
        });

        self.background_tasks.push(handle);
        self.control_server = Some(server);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }

    fn start_background_tasks(&mut self) {
        info!(
            "Starting status poller ({}s interval)...",
            self.config.status_poll_interval().as_secs()
        );
        let poller = spawn_status_poller(
            self.orchestrator.clone(),
            self.latest_status.clone(),
            self.is_running.clone(),
            self.config.status_poll_interval(),
        );

        info!("Starting health metrics task (15s interval)...");
        let health_metrics_task = {
            let state = self.control_state();
            let metrics = self.metrics.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(15));
                let start_time = tokio::time::Instant::now();

                while *is_running.read().await {
                    interval.tick().await;

                    metrics
                        .service()
                        .uptime_seconds
                        .set(start_time.elapsed().as_secs() as i64);

                    match HealthCheck::check(&state).await {
                        Ok(health) => metrics.update_health_status(health.status.as_gauge()),
                        Err(e) => warn!("Health check failed: {}", e),
                    }
                }

                info!("Health metrics task stopped");
            })
        };

        self.background_tasks.push(poller);
        self.background_tasks.push(health_metrics_task);
        info!("Background tasks started");
    }

    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}

/// Poll the local client on a fixed cadence and publish each snapshot
///
/// Shares only the probe's read path with joins; it never touches a running
/// attempt.
pub fn spawn_status_poller(
    orchestrator: Arc<JoinOrchestrator>,
    latest: Arc<watch::Sender<Option<StatusSnapshot>>>,
    is_running: Arc<RwLock<bool>>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        info!("Status poller started");

        while *is_running.read().await {
            interval.tick().await;

            let snapshot = orchestrator.check_status().await;
            let previous = latest.send_replace(Some(snapshot.clone()));
            log_transition(previous.as_ref(), &snapshot);
        }

        info!("Status poller stopped");
    })
}

fn log_transition(previous: Option<&StatusSnapshot>, current: &StatusSnapshot) {
    let Some(previous) = previous else {
        info!(
            "Local client {}",
            if current.client_present {
                "detected"
            } else {
                "not running"
            }
        );
        return;
    };

    if previous.client_present != current.client_present {
        if current.client_present {
            info!("Local client started");
        } else {
            info!("Local client stopped");
        }
    }
    if previous.account_identity != current.account_identity {
        if let Some(account) = &current.account_identity {
            info!("Signed in as {}", account);
        }
    }
    if previous.phase != current.phase {
        debug!("Client phase {} -> {}", previous.phase, current.phase);
    }
}
