//! Join driver state machine
//!
//! Drives the local client from wherever it is into the lobby named by a
//! descriptor. Every state owns its own bounded retries; nothing retries
//! across a state boundary. Cancellation is honoured between states only,
//! since a local action cannot be interrupted safely once issued.

use crate::client::{ClientProbe, LocalClientApi};
use crate::config::JoinSettings;
use crate::error::{ClientApiError, ClientResult, JoinErrorKind};
use crate::join::attempt::{JoinAttempt, JoinReport, JoinState};
use crate::join::cancel::AttemptControls;
use crate::types::{AvailableLobby, ClientSession, GamePhase, LobbyDescriptor};
use crate::utils::Clock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Active states, the only ones with work to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Preparing,
    Locating,
    Entering,
    Verifying,
}

impl Step {
    fn state(self) -> JoinState {
        match self {
            Step::Preparing => JoinState::Preparing,
            Step::Locating => JoinState::Locating,
            Step::Entering => JoinState::Entering,
            Step::Verifying => JoinState::Verifying,
        }
    }
}

/// `Ok(Some(step))` moves on, `Ok(None)` means joined
type StepResult = Result<Option<Step>, JoinErrorKind>;

/// Runs join attempts against the local client
#[derive(Clone)]
pub struct JoinDriver {
    api: Arc<dyn LocalClientApi>,
    probe: ClientProbe,
    settings: JoinSettings,
    action_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl JoinDriver {
    pub fn new(
        api: Arc<dyn LocalClientApi>,
        probe: ClientProbe,
        settings: JoinSettings,
        action_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            probe,
            settings,
            action_timeout,
            clock,
        }
    }

    /// Run one attempt to a terminal state
    ///
    /// Takes the descriptor by value: whatever happens, it is gone once this
    /// returns and a retry needs a fresh resolution.
    pub async fn run(
        &self,
        session: ClientSession,
        descriptor: LobbyDescriptor,
        controls: &AttemptControls,
    ) -> JoinReport {
        let mut attempt = JoinAttempt::new(session, descriptor, self.clock.now());
        info!(
            "Join attempt {} started for host '{}'",
            attempt.id(),
            attempt
                .descriptor()
                .map(|d| d.host_identity.as_str())
                .unwrap_or_default()
        );

        let mut next = Step::Preparing;
        loop {
            if controls.cancel.is_cancelled() {
                info!("Join attempt {} cancelled before {:?}", attempt.id(), next);
                attempt.fail(JoinErrorKind::Cancelled);
                break;
            }

            attempt.advance(next.state());
            controls.publish(next.state());
            debug!("Join attempt {} entered {:?}", attempt.id(), next);

            let result = match next {
                Step::Preparing => self.prepare(&mut attempt).await,
                Step::Locating => self.locate(&mut attempt).await,
                Step::Entering => self.enter(&mut attempt).await,
                Step::Verifying => self.verify(&mut attempt).await,
            };

            match result {
                Ok(Some(step)) => next = step,
                Ok(None) => {
                    attempt.succeed();
                    break;
                }
                Err(kind) => {
                    attempt.fail(kind);
                    break;
                }
            }
        }

        controls.publish(attempt.state());
        let report = attempt.into_report(self.clock.now());
        match report.error {
            None => info!(
                "Join attempt {} succeeded after {} actions",
                report.attempt_id, report.attempts_made
            ),
            Some(kind) => warn!(
                "Join attempt {} failed: {} ({} actions)",
                report.attempt_id,
                kind.as_label(),
                report.attempts_made
            ),
        }
        report
    }

    async fn prepare(&self, attempt: &mut JoinAttempt) -> StepResult {
        let session = attempt.session().clone();
        if !session.present {
            return Err(JoinErrorKind::ClientNotRunning);
        }

        match session.phase {
            GamePhase::InGame | GamePhase::Matchmaking => Err(JoinErrorKind::ClientBusy),
            GamePhase::Unknown => Err(JoinErrorKind::ProbeDecodeError),
            GamePhase::None => Ok(Some(Step::Locating)),
            GamePhase::Lobby => {
                let target = attempt
                    .descriptor()
                    .map(|d| d.lobby_id.clone())
                    .ok_or(JoinErrorKind::LobbyGone)?;
                if !target.is_empty() && session.is_in_lobby(&target) {
                    debug!("Client already sits in lobby {}", target);
                    attempt.set_target(target);
                    return Ok(Some(Step::Verifying));
                }

                attempt.record_action();
                if let Err(e) = self.call(self.api.leave_lobby()).await {
                    warn!("Could not leave the current lobby: {}", e);
                    return Err(JoinErrorKind::ClientBusy);
                }

                let observed = self.probe.poll().await.session;
                let present = observed.present;
                attempt.observe(observed);
                if !present {
                    return Err(JoinErrorKind::ClientNotRunning);
                }
                Ok(Some(Step::Locating))
            }
        }
    }

    async fn locate(&self, attempt: &mut JoinAttempt) -> StepResult {
        let (lobby_id, host, expires_at) = attempt
            .descriptor()
            .map(|d| (d.lobby_id.clone(), d.host_identity.clone(), d.expires_at))
            .ok_or(JoinErrorKind::LobbyGone)?;

        if self.clock.now() >= expires_at {
            return Err(JoinErrorKind::LobbyExpired);
        }

        attempt.record_action();
        let lobbies = match self.call(self.api.available_lobbies()).await {
            Ok(lobbies) => lobbies,
            Err(e) if e.is_absent() => return Err(JoinErrorKind::ClientNotRunning),
            Err(ClientApiError::Busy) => return Err(JoinErrorKind::ClientBusy),
            Err(e) => {
                warn!("Could not list custom lobbies: {}", e);
                return Err(JoinErrorKind::LobbyGone);
            }
        };

        let located = find_lobby(&lobbies, &lobby_id, &host).ok_or_else(|| {
            debug!(
                "Lobby for host '{}' not among {} listed lobbies",
                host,
                lobbies.len()
            );
            JoinErrorKind::LobbyGone
        })?;

        debug!("Located lobby {}", located.id);
        attempt.set_target(located.id.clone());
        Ok(Some(Step::Entering))
    }

    async fn enter(&self, attempt: &mut JoinAttempt) -> StepResult {
        let target = attempt
            .target_lobby()
            .cloned()
            .ok_or(JoinErrorKind::LobbyGone)?;
        let parameters = attempt
            .descriptor()
            .map(|d| d.join_parameters.clone())
            .ok_or(JoinErrorKind::LobbyGone)?;

        let mut retries_left = self.settings.enter_retries;
        loop {
            attempt.record_action();
            match self.call(self.api.join_lobby(&target, &parameters)).await {
                Ok(()) => break,
                Err(ClientApiError::Busy | ClientApiError::Timeout) if retries_left > 0 => {
                    retries_left -= 1;
                    debug!(
                        "Client busy joining {}, {} retries left",
                        target, retries_left
                    );
                    sleep(self.settings.enter_retry_delay()).await;
                }
                Err(ClientApiError::Busy | ClientApiError::Timeout) => {
                    return Err(JoinErrorKind::JoinRejected)
                }
                Err(ClientApiError::NotFound) => return Err(JoinErrorKind::LobbyGone),
                Err(ClientApiError::Unreachable) => return Err(JoinErrorKind::ClientNotRunning),
                Err(e) => {
                    warn!("Client refused to join {}: {}", target, e);
                    return Err(JoinErrorKind::JoinRejected);
                }
            }
        }

        let observed = self.probe.poll().await.session;
        attempt.observe(observed);
        Ok(Some(Step::Verifying))
    }

    async fn verify(&self, attempt: &mut JoinAttempt) -> StepResult {
        let target = attempt
            .target_lobby()
            .cloned()
            .ok_or(JoinErrorKind::LobbyGone)?;

        let observations = self.settings.verify_attempts.max(1);
        for observation in 1..=observations {
            // Entering already polled once; reuse that snapshot first
            let session = if observation == 1 {
                attempt.session().clone()
            } else {
                let session = self.probe.poll().await.session;
                attempt.observe(session.clone());
                session
            };

            if session.is_in_lobby(&target) {
                return Ok(None);
            }

            debug!(
                "Verification {}/{}: client in {:?} lobby {:?}",
                observation, observations, session.phase, session.lobby_id
            );
            if observation < observations {
                sleep(self.settings.verify_retry_delay()).await;
            }
        }

        Err(JoinErrorKind::VerificationTimeout)
    }

    async fn call<T>(&self, action: impl Future<Output = ClientResult<T>>) -> ClientResult<T> {
        tokio::time::timeout(self.action_timeout, action)
            .await
            .unwrap_or(Err(ClientApiError::Timeout))
    }
}

/// Pick the target among listed lobbies
///
/// A descriptor that names a lobby matches that id only. Descriptors without
/// an id match the host's display name exactly, ignoring case and spacing.
pub(crate) fn find_lobby<'a>(
    lobbies: &'a [AvailableLobby],
    lobby_id: &str,
    host: &str,
) -> Option<&'a AvailableLobby> {
    if !lobby_id.is_empty() {
        return lobbies.iter().find(|l| l.id == lobby_id);
    }

    let host = normalize_owner(host);
    if host.is_empty() {
        return None;
    }

    lobbies
        .iter()
        .find(|l| normalize_owner(&l.owner_display_name) == host)
}

/// Lowercase and strip the spacing the client puts around `#`
fn normalize_owner(raw: &str) -> String {
    raw.split('#')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("#")
        .to_lowercase()
}
