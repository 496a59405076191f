//! Remote match resolution
//!
//! Maps a human-entered password to a lobby descriptor through the remote
//! matching service. Password checks happen server-side only; the agent never
//! validates or guesses passwords locally.

pub mod http;

use crate::types::{LobbyDescriptor, Password};
use async_trait::async_trait;

pub use http::HttpMatchResolver;

/// Result of a password lookup
#[derive(Debug, PartialEq)]
pub enum ResolveOutcome {
    /// The password maps to a joinable lobby
    Resolved(LobbyDescriptor),
    /// No active lobby uses this password
    NotFound,
    /// The password matched but this account may not use it
    Denied,
    /// The service could not be reached, after bounded retries
    Unreachable,
}

impl ResolveOutcome {
    /// Stable label used for metrics
    pub fn as_label(&self) -> &'static str {
        match self {
            ResolveOutcome::Resolved(_) => "resolved",
            ResolveOutcome::NotFound => "not_found",
            ResolveOutcome::Denied => "denied",
            ResolveOutcome::Unreachable => "unreachable",
        }
    }
}

/// Trait for services that resolve lobby passwords
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MatchResolver: Send + Sync {
    /// Resolve `password` on behalf of `account_identity`
    async fn resolve(&self, account_identity: &str, password: &Password) -> ResolveOutcome;
}
