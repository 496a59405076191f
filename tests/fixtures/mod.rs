//! Test fixtures and fake implementations for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use league_link::client::LocalClientApi;
use league_link::config::AppConfig;
use league_link::error::{ClientApiError, ClientResult};
use league_link::metrics::MetricsCollector;
use league_link::registration::StaticRegistration;
use league_link::resolver::{MatchResolver, ResolveOutcome};
use league_link::types::{AccountIdentity, AvailableLobby, LobbyDescriptor, LobbyId, Password};
use league_link::utils::{Clock, ManualClock, SystemClock};
use league_link::JoinOrchestrator;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const ACCOUNT: &str = "acct-1";
pub const TARGET_LOBBY: &str = "L123";
pub const HOST: &str = "Host#EUW";

/// What the fake local client currently reports
#[derive(Debug, Clone)]
pub struct ClientState {
    pub running: bool,
    pub phase: String,
    pub account: Option<AccountIdentity>,
    pub region: Option<String>,
    pub lobby: Option<LobbyId>,
    pub available: Vec<AvailableLobby>,
    /// Lobby reported after a successful join; defaults to the joined id
    pub lobby_after_join: Option<LobbyId>,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            running: true,
            phase: "None".to_string(),
            account: Some("Player#EUW".to_string()),
            region: Some("EUW".to_string()),
            lobby: None,
            available: vec![AvailableLobby {
                id: TARGET_LOBBY.to_string(),
                owner_display_name: HOST.to_string(),
            }],
            lobby_after_join: None,
        }
    }
}

/// Local client fake driven by a script of join responses
#[derive(Default)]
pub struct ScriptedClient {
    state: Mutex<ClientState>,
    join_script: Mutex<VecDeque<ClientResult<()>>>,
    join_calls: AtomicUsize,
    leave_calls: AtomicUsize,
    list_calls: AtomicUsize,
    /// Notified when the lobby list is requested
    pub listing_entered: Arc<Notify>,
    listing_gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedClient {
    pub fn new(state: ClientState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    /// A client that is not running at all
    pub fn absent() -> Self {
        Self::new(ClientState {
            running: false,
            ..ClientState::default()
        })
    }

    /// Queue responses for the next join calls; an empty script succeeds
    pub fn script_joins(&self, responses: impl IntoIterator<Item = ClientResult<()>>) {
        self.join_script.lock().unwrap().extend(responses);
    }

    /// Hold every lobby list request until `gate` is notified
    pub fn hold_listing(&self, gate: Arc<Notify>) {
        *self.listing_gate.lock().unwrap() = Some(gate);
    }

    pub fn join_calls(&self) -> usize {
        self.join_calls.load(Ordering::SeqCst)
    }

    pub fn leave_calls(&self) -> usize {
        self.leave_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn current_lobby_id(&self) -> Option<LobbyId> {
        self.state.lock().unwrap().lobby.clone()
    }

    fn running_state(&self) -> ClientResult<ClientState> {
        let state = self.state.lock().unwrap().clone();
        if state.running {
            Ok(state)
        } else {
            Err(ClientApiError::Unreachable)
        }
    }
}

#[async_trait]
impl LocalClientApi for ScriptedClient {
    async fn gameflow_phase(&self) -> ClientResult<String> {
        Ok(self.running_state()?.phase)
    }

    async fn current_account(&self) -> ClientResult<Option<AccountIdentity>> {
        Ok(self.running_state()?.account)
    }

    async fn region(&self) -> ClientResult<Option<String>> {
        Ok(self.running_state()?.region)
    }

    async fn current_lobby(&self) -> ClientResult<Option<LobbyId>> {
        Ok(self.running_state()?.lobby)
    }

    async fn leave_lobby(&self) -> ClientResult<()> {
        self.running_state()?;
        self.leave_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.lobby = None;
        state.phase = "None".to_string();
        Ok(())
    }

    async fn available_lobbies(&self) -> ClientResult<Vec<AvailableLobby>> {
        self.running_state()?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.listing_entered.notify_one();

        let gate = self.listing_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.running_state()?.available)
    }

    async fn join_lobby(
        &self,
        lobby_id: &str,
        _join_parameters: &serde_json::Value,
    ) -> ClientResult<()> {
        self.running_state()?;
        self.join_calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self.join_script.lock().unwrap().pop_front();
        if let Some(Err(e)) = scripted {
            return Err(e);
        }

        let mut state = self.state.lock().unwrap();
        state.lobby = Some(
            state
                .lobby_after_join
                .clone()
                .unwrap_or_else(|| lobby_id.to_string()),
        );
        state.phase = "Lobby".to_string();
        Ok(())
    }
}

/// Build a descriptor for `TARGET_LOBBY` resolved for `account`
pub fn descriptor(account: &str, expires_at: DateTime<Utc>) -> LobbyDescriptor {
    LobbyDescriptor {
        lobby_id: TARGET_LOBBY.to_string(),
        host_identity: HOST.to_string(),
        expires_at,
        join_parameters: json!({ "password": "4321" }),
        resolved_for: account.to_string(),
    }
}

type OutcomeFn = Box<dyn Fn(&str, DateTime<Utc>) -> ResolveOutcome + Send + Sync>;

/// Matching service fake with call counting and optional gating
pub struct FakeResolver {
    outcome: OutcomeFn,
    calls: AtomicUsize,
    clock: Arc<dyn Clock>,
    /// Notified when a lookup starts
    pub entered: Arc<Notify>,
    /// When set, lookups wait for a permit before answering
    gate: Option<Arc<Notify>>,
    /// Clock moved forward after answering
    skew: Option<(ManualClock, ChronoDuration)>,
}

impl FakeResolver {
    pub fn new(
        outcome: impl Fn(&str, DateTime<Utc>) -> ResolveOutcome + Send + Sync + 'static,
    ) -> Self {
        Self {
            outcome: Box::new(outcome),
            calls: AtomicUsize::new(0),
            clock: Arc::new(SystemClock),
            entered: Arc::new(Notify::new()),
            gate: None,
            skew: None,
        }
    }

    /// Resolves every password to `TARGET_LOBBY`, valid for a minute
    pub fn resolving() -> Self {
        Self::new(|account, now| {
            ResolveOutcome::Resolved(descriptor(account, now + ChronoDuration::seconds(60)))
        })
    }

    pub fn answering(outcome: fn() -> ResolveOutcome) -> Self {
        Self::new(move |_, _| outcome())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Hold every lookup until `gate` is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Advance `clock` by `by` once the descriptor has been produced
    pub fn skewing(mut self, clock: ManualClock, by: ChronoDuration) -> Self {
        self.skew = Some((clock, by));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MatchResolver for FakeResolver {
    async fn resolve(&self, account_identity: &str, _password: &Password) -> ResolveOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let outcome = (self.outcome)(account_identity, self.clock.now());
        if let Some((clock, by)) = &self.skew {
            clock.advance(*by);
        }
        outcome
    }
}

/// Configuration with short retry delays for fast tests
pub fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.join.enter_retry_delay_ms = 5;
    config.join.verify_retry_delay_ms = 5;
    config.client.probe_timeout_ms = 500;
    config.client.action_timeout_ms = 500;
    config
}

/// Orchestrator over the given fakes with a registered account
pub fn orchestrator(client: Arc<ScriptedClient>, resolver: Arc<FakeResolver>) -> JoinOrchestrator {
    orchestrator_with_clock(client, resolver, Arc::new(SystemClock))
}

pub fn orchestrator_with_clock(
    client: Arc<ScriptedClient>,
    resolver: Arc<FakeResolver>,
    clock: Arc<dyn Clock>,
) -> JoinOrchestrator {
    JoinOrchestrator::with_clock(
        client,
        resolver,
        Arc::new(StaticRegistration::registered(ACCOUNT)),
        &fast_config(),
        Arc::new(MetricsCollector::new().expect("Failed to create metrics collector")),
        clock,
    )
}
