//! Join attempt state and lifecycle
//!
//! A `JoinAttempt` is owned by exactly one running join and only ever moves
//! forward through its states. It holds the lobby descriptor until it reaches
//! a terminal state, at which point the descriptor is dropped.

use crate::error::JoinErrorKind;
use crate::types::{ClientSession, JoinResult, LobbyDescriptor, LobbyId};
use crate::utils::generate_attempt_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// States of a join attempt, in the only order they may be visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JoinState {
    /// Not yet driving the client: registration and password lookup
    Idle,
    /// Checking client presence and phase, leaving an unrelated lobby
    Preparing,
    /// Looking the lobby up in the client
    Locating,
    /// Issuing the join action
    Entering,
    /// Confirming the client ended up in the lobby
    Verifying,
    /// Terminal: joined
    Succeeded,
    /// Terminal: gave up
    Failed,
}

impl JoinState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JoinState::Succeeded | JoinState::Failed)
    }
}

/// One join operation from preparation to a terminal state
#[derive(Debug)]
pub struct JoinAttempt {
    id: Uuid,
    state: JoinState,
    session: ClientSession,
    descriptor: Option<LobbyDescriptor>,
    target_lobby: Option<LobbyId>,
    started_at: DateTime<Utc>,
    attempts_made: u32,
    last_error: Option<JoinErrorKind>,
    history: Vec<JoinState>,
}

impl JoinAttempt {
    /// Start an attempt from the session observed before resolution
    pub fn new(
        session: ClientSession,
        descriptor: LobbyDescriptor,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_attempt_id(),
            state: JoinState::Idle,
            session,
            descriptor: Some(descriptor),
            target_lobby: None,
            started_at,
            attempts_made: 0,
            last_error: None,
            history: vec![JoinState::Idle],
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    /// Most recent client snapshot seen by this attempt
    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    /// The descriptor, present until the attempt ends
    pub fn descriptor(&self) -> Option<&LobbyDescriptor> {
        self.descriptor.as_ref()
    }

    /// Lobby the attempt is joining once it has been located
    pub fn target_lobby(&self) -> Option<&LobbyId> {
        self.target_lobby.as_ref()
    }

    /// States visited, in order
    pub fn history(&self) -> &[JoinState] {
        &self.history
    }

    /// Move to `next`; backward moves and moves out of a terminal state are refused
    pub(crate) fn advance(&mut self, next: JoinState) -> bool {
        if self.state.is_terminal() || next <= self.state {
            warn!(
                "Join attempt {} refused transition {:?} -> {:?}",
                self.id, self.state, next
            );
            return false;
        }
        self.state = next;
        self.history.push(next);
        true
    }

    /// Replace the session with a newer poll
    pub(crate) fn observe(&mut self, session: ClientSession) {
        self.session = session;
    }

    pub(crate) fn set_target(&mut self, lobby_id: LobbyId) {
        self.target_lobby = Some(lobby_id);
    }

    pub(crate) fn record_action(&mut self) {
        self.attempts_made += 1;
    }

    pub(crate) fn succeed(&mut self) {
        self.advance(JoinState::Succeeded);
        self.descriptor = None;
    }

    pub(crate) fn fail(&mut self, kind: JoinErrorKind) {
        self.last_error = Some(kind);
        self.advance(JoinState::Failed);
        self.descriptor = None;
    }

    /// Summarise a finished attempt
    pub(crate) fn into_report(self, finished_at: DateTime<Utc>) -> JoinReport {
        let lobby_id = match self.state {
            JoinState::Succeeded => self.target_lobby,
            _ => None,
        };
        JoinReport {
            attempt_id: self.id,
            final_state: self.state,
            error: self.last_error,
            lobby_id,
            attempts_made: self.attempts_made,
            history: self.history,
            started_at: self.started_at,
            finished_at,
        }
    }
}

/// What is left of an attempt once it has finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinReport {
    pub attempt_id: Uuid,
    pub final_state: JoinState,
    pub error: Option<JoinErrorKind>,
    pub lobby_id: Option<LobbyId>,
    pub attempts_made: u32,
    pub history: Vec<JoinState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JoinReport {
    pub fn succeeded(&self) -> bool {
        self.final_state == JoinState::Succeeded
    }

    /// Map to the user-facing result
    pub fn to_result(&self) -> JoinResult {
        match (&self.lobby_id, self.error) {
            (Some(lobby_id), None) if self.succeeded() => JoinResult::success(lobby_id.clone()),
            (_, Some(kind)) => JoinResult::failure(kind),
            // A finished attempt without a recorded cause never passed verification
            _ => JoinResult::failure(JoinErrorKind::VerificationTimeout),
        }
    }
}
