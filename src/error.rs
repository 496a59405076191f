//! Error types for the join agent
//!
//! `JoinErrorKind` is the closed taxonomy every join outcome is reduced to.
//! `ClientApiError` classifies local client failures so the driver can tell a
//! busy client from a refused request, and `LinkError` covers infrastructure
//! problems surfaced through `anyhow`.

use serde::{Deserialize, Serialize};

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Terminal failure kinds of a join operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum JoinErrorKind {
    #[error("client not running")]
    ClientNotRunning,

    #[error("account not registered")]
    NotRegistered,

    #[error("client busy")]
    ClientBusy,

    #[error("lobby gone")]
    LobbyGone,

    #[error("lobby expired")]
    LobbyExpired,

    #[error("join rejected")]
    JoinRejected,

    #[error("verification timed out")]
    VerificationTimeout,

    #[error("password not found")]
    PasswordNotFound,

    #[error("resolver denied")]
    ResolverDenied,

    #[error("resolver unreachable")]
    ResolverUnreachable,

    #[error("already joining")]
    AlreadyJoining,

    #[error("probe decode error")]
    ProbeDecodeError,

    #[error("cancelled")]
    Cancelled,
}

impl JoinErrorKind {
    /// The single user-facing message for this kind
    pub fn user_message(&self) -> &'static str {
        match self {
            JoinErrorKind::ClientNotRunning => "client not running",
            JoinErrorKind::NotRegistered => {
                "account not registered; register this account before joining"
            }
            JoinErrorKind::ClientBusy => {
                "client is busy in a match or queue; finish it and try again"
            }
            JoinErrorKind::LobbyGone => "the lobby no longer exists",
            JoinErrorKind::LobbyExpired => "the lobby has expired; ask the host for a new password",
            JoinErrorKind::JoinRejected => "the client rejected the join request",
            JoinErrorKind::VerificationTimeout => "could not confirm that you joined the lobby",
            JoinErrorKind::PasswordNotFound => "incorrect password or no such game",
            JoinErrorKind::ResolverDenied => "access denied for this account",
            JoinErrorKind::ResolverUnreachable => "could not reach the matching service",
            JoinErrorKind::AlreadyJoining => "a join is already in progress",
            JoinErrorKind::ProbeDecodeError => "could not read the client's current state",
            JoinErrorKind::Cancelled => "join cancelled",
        }
    }

    /// Stable label used for metrics
    pub fn as_label(&self) -> &'static str {
        match self {
            JoinErrorKind::ClientNotRunning => "client_not_running",
            JoinErrorKind::NotRegistered => "not_registered",
            JoinErrorKind::ClientBusy => "client_busy",
            JoinErrorKind::LobbyGone => "lobby_gone",
            JoinErrorKind::LobbyExpired => "lobby_expired",
            JoinErrorKind::JoinRejected => "join_rejected",
            JoinErrorKind::VerificationTimeout => "verification_timeout",
            JoinErrorKind::PasswordNotFound => "password_not_found",
            JoinErrorKind::ResolverDenied => "resolver_denied",
            JoinErrorKind::ResolverUnreachable => "resolver_unreachable",
            JoinErrorKind::AlreadyJoining => "already_joining",
            JoinErrorKind::ProbeDecodeError => "probe_decode_error",
            JoinErrorKind::Cancelled => "cancelled",
        }
    }
}

/// Failures of a single call against the local client API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientApiError {
    #[error("local client is not reachable")]
    Unreachable,

    #[error("local client request timed out")]
    Timeout,

    #[error("local client is busy")]
    Busy,

    #[error("local client refused the request: {message}")]
    Refused { message: String },

    #[error("resource not found on local client")]
    NotFound,

    #[error("unexpected response from local client: {reason}")]
    Decode { reason: String },
}

impl ClientApiError {
    /// True when the failure means the client is simply not there
    pub fn is_absent(&self) -> bool {
        matches!(self, ClientApiError::Unreachable | ClientApiError::Timeout)
    }
}

/// Result of a local client call
pub type ClientResult<T> = std::result::Result<T, ClientApiError>;

/// Infrastructure errors for the agent
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Lockfile error: {message}")]
    LockfileError { message: String },

    #[error("HTTP client error: {message}")]
    HttpClientError { message: String },

    #[error("Settings error: {message}")]
    SettingsError { message: String },
}
