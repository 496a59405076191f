//! Join orchestration
//!
//! `JoinOrchestrator` is the single entry point the surrounding application
//! uses: `join_game` runs one complete join and `check_status` passes a fresh
//! probe snapshot through. At most one join runs at a time; a second call
//! while one is in flight is turned away with `AlreadyJoining` and leaves the
//! running attempt untouched.

use crate::client::{ClientProbe, LocalClientApi, ProbeOutcome};
use crate::config::AppConfig;
use crate::error::JoinErrorKind;
use crate::join::{cancel_pair, AttemptControls, CancelHandle, JoinDriver, JoinState};
use crate::metrics::MetricsCollector;
use crate::registration::RegistrationSource;
use crate::resolver::{MatchResolver, ResolveOutcome};
use crate::types::{JoinResult, Password, StatusSnapshot};
use crate::utils::{Clock, SystemClock};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Composes probe, resolver, registration and driver into one operation
pub struct JoinOrchestrator {
    probe: ClientProbe,
    resolver: Arc<dyn MatchResolver>,
    registration: Arc<dyn RegistrationSource>,
    driver: JoinDriver,
    metrics: Arc<MetricsCollector>,
    in_flight: Mutex<()>,
    cancel: StdMutex<Option<CancelHandle>>,
    progress: Arc<watch::Sender<Option<JoinState>>>,
}

/// Held for the duration of one join; resets shared state however the join ends
struct InFlightGuard<'a> {
    orchestrator: &'a JoinOrchestrator,
    _lock: MutexGuard<'a, ()>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.progress.send_replace(None);
        if let Ok(mut slot) = self.orchestrator.cancel.lock() {
            *slot = None;
        }
        self.orchestrator.metrics.set_join_in_flight(false);
    }
}

impl JoinOrchestrator {
    pub fn new(
        api: Arc<dyn LocalClientApi>,
        resolver: Arc<dyn MatchResolver>,
        registration: Arc<dyn RegistrationSource>,
        config: &AppConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self::with_clock(
            api,
            resolver,
            registration,
            config,
            metrics,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        api: Arc<dyn LocalClientApi>,
        resolver: Arc<dyn MatchResolver>,
        registration: Arc<dyn RegistrationSource>,
        config: &AppConfig,
        metrics: Arc<MetricsCollector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let probe = ClientProbe::with_clock(
            api.clone(),
            config.client.probe_timeout(),
            clock.clone(),
        );
        let driver = JoinDriver::new(
            api,
            probe.clone(),
            config.join.clone(),
            config.client.action_timeout(),
            clock,
        );
        let (progress, _) = watch::channel(None);

        Self {
            probe,
            resolver,
            registration,
            driver,
            metrics,
            in_flight: Mutex::new(()),
            cancel: StdMutex::new(None),
            progress: Arc::new(progress),
        }
    }

    /// Join the lobby behind `password`
    pub async fn join_game(&self, password: Password) -> JoinResult {
        let _guard = match self.in_flight.try_lock() {
            Ok(lock) => InFlightGuard {
                orchestrator: self,
                _lock: lock,
            },
            Err(_) => {
                debug!("Join requested while another is in flight");
                self.metrics
                    .record_join_outcome(JoinErrorKind::AlreadyJoining.as_label());
                return JoinResult::failure(JoinErrorKind::AlreadyJoining);
            }
        };
        self.metrics.set_join_in_flight(true);

        let (handle, signal) = cancel_pair();
        if let Ok(mut slot) = self.cancel.lock() {
            *slot = Some(handle);
        }
        let controls = AttemptControls::new(signal, self.progress.clone());
        controls.publish(JoinState::Idle);

        let result = self.run_join(password, &controls).await;
        let outcome = result.error.map(|e| e.as_label()).unwrap_or("succeeded");
        self.metrics.record_join_outcome(outcome);
        result
    }

    async fn run_join(&self, password: Password, controls: &AttemptControls) -> JoinResult {
        let registration = self.registration.registration_status().await;
        let account = match registration.account_identity {
            Some(account) if registration.registered && !account.is_empty() => account,
            _ => {
                info!("Join refused: account not registered");
                return JoinResult::failure(JoinErrorKind::NotRegistered);
            }
        };

        let session = self.poll().await.session;
        if !session.present {
            info!("Join refused: local client not running");
            return JoinResult::failure(JoinErrorKind::ClientNotRunning);
        }

        // An empty password can never match; no need to ask the service
        if password.is_empty() {
            return JoinResult::failure(JoinErrorKind::PasswordNotFound);
        }

        if controls.cancel.is_cancelled() {
            info!("Join cancelled before password lookup");
            return JoinResult::failure(JoinErrorKind::Cancelled);
        }

        let timer = self.metrics.start_timer();
        let outcome = self.resolver.resolve(&account, &password).await;
        self.metrics.record_resolve(&outcome, timer.stop());

        let descriptor = match outcome {
            ResolveOutcome::Resolved(descriptor) => descriptor,
            ResolveOutcome::NotFound => {
                info!("No active lobby for the given password");
                return JoinResult::failure(JoinErrorKind::PasswordNotFound);
            }
            ResolveOutcome::Denied => {
                info!("Matching service denied account '{}'", account);
                return JoinResult::failure(JoinErrorKind::ResolverDenied);
            }
            ResolveOutcome::Unreachable => {
                return JoinResult::failure(JoinErrorKind::ResolverUnreachable);
            }
        };

        // The descriptor is dropped on return; a later join resolves again
        if controls.cancel.is_cancelled() {
            info!("Join cancelled during password lookup");
            return JoinResult::failure(JoinErrorKind::Cancelled);
        }

        // Guards resolvers that answer for an account other than the one asked
        if descriptor.resolved_for != account {
            warn!("Descriptor was resolved for a different account");
            return JoinResult::failure(JoinErrorKind::ResolverDenied);
        }

        let timer = self.metrics.start_timer();
        let report = self.driver.run(session, descriptor, controls).await;
        self.metrics.record_join_report(&report, timer.stop());

        report.to_result()
    }

    /// Fresh snapshot of the local client
    pub async fn check_status(&self) -> StatusSnapshot {
        StatusSnapshot::from(&self.poll().await.session)
    }

    /// Ask the running join to stop at its next state boundary
    ///
    /// Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        match self.cancel.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(handle) => {
                    info!("Cancelling the running join");
                    handle.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// State of the running join, `None` when idle
    pub fn in_flight_state(&self) -> Option<JoinState> {
        *self.progress.borrow()
    }

    /// Follow the running join's state changes
    pub fn subscribe_progress(&self) -> watch::Receiver<Option<JoinState>> {
        self.progress.subscribe()
    }

    async fn poll(&self) -> ProbeOutcome {
        let outcome = self.probe.poll().await;
        self.metrics
            .record_probe_poll(outcome.session.present, outcome.diagnostics.len());
        outcome
    }
}
