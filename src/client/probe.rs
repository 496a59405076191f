//! Local client probe
//!
//! Builds a fresh `ClientSession` snapshot from the local client's status
//! endpoints. A client that is not running is a normal outcome, not an
//! error; content the probe cannot interpret is reported as diagnostics next
//! to a best-effort snapshot.

use crate::client::api::LocalClientApi;
use crate::error::{ClientApiError, ClientResult};
use crate::types::{ClientSession, GamePhase};
use crate::utils::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Non-fatal decoding problem observed while polling
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not decode {field}: {reason}")]
pub struct ProbeDecodeError {
    pub field: &'static str,
    pub reason: String,
}

/// Snapshot plus whatever could not be decoded while taking it
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub session: ClientSession,
    pub diagnostics: Vec<ProbeDecodeError>,
}

impl ProbeOutcome {
    fn absent(session: ClientSession) -> Self {
        Self {
            session,
            diagnostics: Vec::new(),
        }
    }
}

/// Read-only poller of the local client
#[derive(Clone)]
pub struct ClientProbe {
    api: Arc<dyn LocalClientApi>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl ClientProbe {
    /// Create a probe bounded by `timeout` per poll
    pub fn new(api: Arc<dyn LocalClientApi>, timeout: Duration) -> Self {
        Self::with_clock(api, timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(api: Arc<dyn LocalClientApi>, timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            timeout,
            clock,
        }
    }

    /// Take one snapshot; never blocks longer than the probe timeout
    pub async fn poll(&self) -> ProbeOutcome {
        match tokio::time::timeout(self.timeout, self.observe()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!("Client probe timed out after {:?}", self.timeout);
                ProbeOutcome::absent(ClientSession::absent(self.clock.now()))
            }
        }
    }

    async fn observe(&self) -> ProbeOutcome {
        let observed_at = self.clock.now();
        let mut diagnostics = Vec::new();

        let phase = match self.api.gameflow_phase().await {
            Ok(raw) => GamePhase::from_gameflow(&raw).unwrap_or_else(|| {
                diagnostics.push(ProbeDecodeError {
                    field: "phase",
                    reason: format!("unrecognised gameflow phase {:?}", raw),
                });
                GamePhase::Unknown
            }),
            Err(e) if e.is_absent() => {
                return ProbeOutcome::absent(ClientSession::absent(observed_at));
            }
            Err(e) => {
                diagnostics.push(ProbeDecodeError {
                    field: "phase",
                    reason: e.to_string(),
                });
                GamePhase::Unknown
            }
        };

        let lobby_call = async {
            if phase == GamePhase::Lobby {
                self.api.current_lobby().await
            } else {
                Ok(None)
            }
        };
        let (account, region, lobby_id) =
            tokio::join!(self.api.current_account(), self.api.region(), lobby_call);

        // The client went away between calls
        if [account.as_ref().err(), region.as_ref().err(), lobby_id.as_ref().err()]
            .into_iter()
            .flatten()
            .any(ClientApiError::is_absent)
        {
            return ProbeOutcome::absent(ClientSession::absent(observed_at));
        }

        let session = ClientSession {
            present: true,
            account_identity: optional_field("account", account, &mut diagnostics),
            region: optional_field("region", region, &mut diagnostics),
            phase,
            lobby_id: optional_field("lobby", lobby_id, &mut diagnostics),
            last_observed_at: observed_at,
        };

        for diagnostic in &diagnostics {
            debug!("Client probe diagnostic: {}", diagnostic);
        }

        ProbeOutcome {
            session,
            diagnostics,
        }
    }
}

fn optional_field<T>(
    field: &'static str,
    result: ClientResult<Option<T>>,
    diagnostics: &mut Vec<ProbeDecodeError>,
) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(ClientApiError::NotFound) => None,
        Err(e) => {
            diagnostics.push(ProbeDecodeError {
                field,
                reason: e.to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::api::MockLocalClientApi;
    use proptest::prelude::*;

    fn probe(mock: MockLocalClientApi) -> ClientProbe {
        ClientProbe::new(Arc::new(mock), Duration::from_millis(500))
    }

    fn mock_with_phase(phase: &'static str) -> MockLocalClientApi {
        let mut mock = MockLocalClientApi::new();
        mock.expect_gameflow_phase()
            .returning(move || Ok(phase.to_string()));
        mock.expect_current_account()
            .returning(|| Ok(Some("Player#EUW".to_string())));
        mock.expect_region().returning(|| Ok(Some("EUW".to_string())));
        mock
    }

    #[tokio::test]
    async fn test_client_not_running() {
        let mut mock = MockLocalClientApi::new();
        mock.expect_gameflow_phase()
            .returning(|| Err(ClientApiError::Unreachable));
        mock.expect_current_account().never();

        let outcome = probe(mock).poll().await;
        assert!(!outcome.session.present);
        assert!(outcome.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_lobby_session() {
        let mut mock = mock_with_phase("Lobby");
        mock.expect_current_lobby()
            .times(1)
            .returning(|| Ok(Some("L123".to_string())));

        let outcome = probe(mock).poll().await;
        assert!(outcome.session.present);
        assert_eq!(outcome.session.phase, GamePhase::Lobby);
        assert_eq!(outcome.session.lobby_id.as_deref(), Some("L123"));
        assert_eq!(
            outcome.session.account_identity.as_deref(),
            Some("Player#EUW")
        );
        assert!(outcome.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_lobby_not_queried_outside_lobby() {
        let mut mock = mock_with_phase("InProgress");
        mock.expect_current_lobby().never();

        let outcome = probe(mock).poll().await;
        assert_eq!(outcome.session.phase, GamePhase::InGame);
        assert_eq!(outcome.session.lobby_id, None);
    }

    #[tokio::test]
    async fn test_unknown_phase_reports_diagnostic() {
        let mock = mock_with_phase("SomethingNew");

        let outcome = probe(mock).poll().await;
        assert!(outcome.session.present);
        assert_eq!(outcome.session.phase, GamePhase::Unknown);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].field, "phase");
    }

    #[tokio::test]
    async fn test_malformed_phase_body_keeps_client_present() {
        let mut mock = MockLocalClientApi::new();
        mock.expect_gameflow_phase().returning(|| {
            Err(ClientApiError::Decode {
                reason: "expected string".to_string(),
            })
        });
        mock.expect_current_account().returning(|| Ok(None));
        mock.expect_region().returning(|| Ok(None));

        let outcome = probe(mock).poll().await;
        assert!(outcome.session.present);
        assert_eq!(outcome.session.phase, GamePhase::Unknown);
        assert!(!outcome.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_client_vanishing_mid_poll() {
        let mut mock = MockLocalClientApi::new();
        mock.expect_gameflow_phase()
            .returning(|| Ok("None".to_string()));
        mock.expect_current_account()
            .returning(|| Err(ClientApiError::Unreachable));
        mock.expect_region().returning(|| Ok(None));

        let outcome = probe(mock).poll().await;
        assert!(!outcome.session.present);
    }

    proptest! {
        #[test]
        fn prop_unrecognised_phases_never_fail_the_poll(raw in "[A-Za-z]{0,16}") {
            prop_assume!(GamePhase::from_gameflow(&raw).is_none());
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let mut mock = MockLocalClientApi::new();
            let phase = raw.clone();
            mock.expect_gameflow_phase().returning(move || Ok(phase.clone()));
            mock.expect_current_account().returning(|| Ok(None));
            mock.expect_region().returning(|| Ok(None));

            let outcome = runtime.block_on(probe(mock).poll());
            prop_assert!(outcome.session.present);
            prop_assert_eq!(outcome.session.phase, GamePhase::Unknown);
            prop_assert_eq!(outcome.diagnostics.len(), 1);
        }
    }
}
