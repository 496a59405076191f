//! Local client API trait
//!
//! The running game client exposes a status endpoint and a handful of lobby
//! actions on localhost. Everything the agent needs from it goes through this
//! trait so the probe and the join driver never see HTTP.

use crate::error::ClientResult;
use crate::types::{AccountIdentity, AvailableLobby, LobbyId};
use async_trait::async_trait;

/// Calls exposed by a running local game client
///
/// Actions are expected to be safe to repeat: leaving when not in a lobby and
/// re-joining the lobby the client already sits in are both no-ops.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocalClientApi: Send + Sync {
    /// Raw gameflow phase string
    async fn gameflow_phase(&self) -> ClientResult<String>;

    /// Logged-in account as `name#tag`, if the client reports one
    async fn current_account(&self) -> ClientResult<Option<AccountIdentity>>;

    /// Upper-cased region code
    async fn region(&self) -> ClientResult<Option<String>>;

    /// Identity of the lobby the client currently sits in
    async fn current_lobby(&self) -> ClientResult<Option<LobbyId>>;

    /// Leave the current lobby
    async fn leave_lobby(&self) -> ClientResult<()>;

    /// Custom lobbies the client can currently see
    async fn available_lobbies(&self) -> ClientResult<Vec<AvailableLobby>>;

    /// Join a located lobby with the resolver-supplied parameters
    async fn join_lobby(
        &self,
        lobby_id: &str,
        join_parameters: &serde_json::Value,
    ) -> ClientResult<()>;
}
