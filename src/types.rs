//! Common types used throughout the join agent

use crate::error::JoinErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a custom lobby as known to the local client
pub type LobbyId = String;

/// Account identity rendered as `name#tag`
pub type AccountIdentity = String;

/// Session phase reported by the local client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamePhase {
    None,
    Lobby,
    Matchmaking,
    InGame,
    /// The client answered but the phase could not be interpreted
    Unknown,
}

impl GamePhase {
    /// Map a raw gameflow phase string to a phase, `None` if unrecognised
    pub fn from_gameflow(raw: &str) -> Option<GamePhase> {
        match raw {
            "None" => Some(GamePhase::None),
            "Lobby" => Some(GamePhase::Lobby),
            "Matchmaking" | "ReadyCheck" => Some(GamePhase::Matchmaking),
            "ChampSelect" | "GameStart" | "InProgress" | "Reconnect" | "WaitingForStats"
            | "PreEndOfGame" | "EndOfGame" => Some(GamePhase::InGame),
            _ => None,
        }
    }

    /// Whether joining a lobby is impossible from this phase
    pub fn is_busy(&self) -> bool {
        matches!(self, GamePhase::Matchmaking | GamePhase::InGame)
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GamePhase::None => write!(f, "None"),
            GamePhase::Lobby => write!(f, "Lobby"),
            GamePhase::Matchmaking => write!(f, "Matchmaking"),
            GamePhase::InGame => write!(f, "InGame"),
            GamePhase::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Immutable snapshot of the local client, replaced wholesale on every poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSession {
    pub present: bool,
    pub account_identity: Option<AccountIdentity>,
    pub region: Option<String>,
    pub phase: GamePhase,
    /// Lobby the client currently sits in, when it reports one
    pub lobby_id: Option<LobbyId>,
    pub last_observed_at: DateTime<Utc>,
}

impl ClientSession {
    /// Snapshot for a client that is not running
    pub fn absent(observed_at: DateTime<Utc>) -> Self {
        Self {
            present: false,
            account_identity: None,
            region: None,
            phase: GamePhase::None,
            lobby_id: None,
            last_observed_at: observed_at,
        }
    }

    /// True when the client sits in the given lobby
    pub fn is_in_lobby(&self, lobby_id: &str) -> bool {
        self.present
            && self.phase == GamePhase::Lobby
            && self.lobby_id.as_deref() == Some(lobby_id)
    }
}

/// Capability to join one lobby, produced by a successful password lookup
///
/// Deliberately not `Clone`: a join attempt takes it by value and drops it
/// when the attempt ends, so a descriptor can never back two attempts.
#[derive(PartialEq)]
pub struct LobbyDescriptor {
    /// Lobby identifier; empty when the service only knows the host
    pub lobby_id: LobbyId,
    pub host_identity: AccountIdentity,
    pub expires_at: DateTime<Utc>,
    /// Opaque parameters forwarded to the client's join action
    pub join_parameters: serde_json::Value,
    /// Account that resolved this descriptor
    pub resolved_for: AccountIdentity,
}

impl LobbyDescriptor {
    /// Whether the descriptor is past its expiry at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for LobbyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // join parameters may carry the lobby pin
        f.debug_struct("LobbyDescriptor")
            .field("lobby_id", &self.lobby_id)
            .field("host_identity", &self.host_identity)
            .field("expires_at", &self.expires_at)
            .field("join_parameters", &"<redacted>")
            .field("resolved_for", &self.resolved_for)
            .finish()
    }
}

/// Registration state supplied by the registration subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationStatus {
    pub registered: bool,
    pub account_identity: Option<AccountIdentity>,
}

impl RegistrationStatus {
    pub fn unregistered() -> Self {
        Self {
            registered: false,
            account_identity: None,
        }
    }

    pub fn registered(account_identity: impl Into<AccountIdentity>) -> Self {
        Self {
            registered: true,
            account_identity: Some(account_identity.into()),
        }
    }
}

/// User-entered lobby password
///
/// Never printed: both `Debug` and `Display` render a mask.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub struct Password(String);

impl Password {
    /// Wrap a raw password, trimming surrounding whitespace
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    /// The raw value, for the request body only
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Password {
    fn from(raw: String) -> Self {
        Password::new(raw)
    }
}

impl From<&str> for Password {
    fn from(raw: &str) -> Self {
        Password::new(raw)
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password(***)")
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

/// Custom lobby listed by the local client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableLobby {
    pub id: LobbyId,
    pub owner_display_name: String,
}

/// Outcome of one `join_game` call, as handed to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResult {
    pub ok: bool,
    pub message: String,
    pub lobby_id: Option<LobbyId>,
    pub error: Option<JoinErrorKind>,
}

impl JoinResult {
    pub fn success(lobby_id: LobbyId) -> Self {
        Self {
            ok: true,
            message: format!("joined lobby {}", lobby_id),
            lobby_id: Some(lobby_id),
            error: None,
        }
    }

    pub fn failure(kind: JoinErrorKind) -> Self {
        Self {
            ok: false,
            message: kind.user_message().to_string(),
            lobby_id: None,
            error: Some(kind),
        }
    }
}

/// Answer to the UI's "Check Status" action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub client_present: bool,
    pub account_identity: Option<AccountIdentity>,
    pub region: Option<String>,
    pub phase: GamePhase,
    pub lobby_id: Option<LobbyId>,
    pub observed_at: DateTime<Utc>,
}

impl From<&ClientSession> for StatusSnapshot {
    fn from(session: &ClientSession) -> Self {
        Self {
            client_present: session.present,
            account_identity: session.account_identity.clone(),
            region: session.region.clone(),
            phase: session.phase,
            lobby_id: session.lobby_id.clone(),
            observed_at: session.last_observed_at,
        }
    }
}
