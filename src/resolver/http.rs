//! HTTP client for the remote matching service

use crate::config::ResolverSettings;
use crate::error::{LinkError, Result};
use crate::resolver::{MatchResolver, ResolveOutcome};
use crate::types::{LobbyDescriptor, Password};
use crate::utils::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const JOIN_MATCH_PATH: &str = "/joinmatch";

#[derive(Serialize)]
struct JoinMatchRequest<'a> {
    account_id: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct DescriptorResponse {
    #[serde(default)]
    lobby_id: String,
    host: String,
    expires_at: DateTime<Utc>,
    #[serde(default)]
    join_parameters: Value,
    /// Account the service resolved for; older services omit it
    #[serde(default)]
    account_id: Option<String>,
}

/// One request's classification before retry handling
#[derive(Debug)]
enum AttemptResult {
    Done(ResolveOutcome),
    Retryable(String),
}

/// Matching service client with bounded retry on connectivity failures
pub struct HttpMatchResolver {
    http: reqwest::Client,
    base_url: String,
    retry_delays: Vec<Duration>,
    legacy_ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl HttpMatchResolver {
    /// Create a resolver from settings
    pub fn new(settings: &ResolverSettings) -> Result<Self> {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: &ResolverSettings, clock: Arc<dyn Clock>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .https_only(settings.base_url.starts_with("https://"))
            .build()
            .map_err(|e| LinkError::HttpClientError {
                message: format!("Failed to create matching service client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            retry_delays: settings.retry_delays(),
            legacy_ttl: settings.legacy_descriptor_ttl(),
            clock,
        })
    }

    async fn try_resolve(&self, account_identity: &str, password: &Password) -> AttemptResult {
        let url = format!("{}{}", self.base_url, JOIN_MATCH_PATH);
        let body = JoinMatchRequest {
            account_id: account_identity,
            password: password.expose(),
        };

        let response = match self.http.post(&url).json(&body).send().await {
            Ok(response) => response,
            // Drop the URL so nothing request-specific reaches the logs
            Err(e) => return AttemptResult::Retryable(e.without_url().to_string()),
        };

        match response.status() {
            status if status.is_success() => match response.text().await {
                Ok(text) => match self.parse_descriptor(&text, account_identity) {
                    Some(descriptor) => AttemptResult::Done(ResolveOutcome::Resolved(descriptor)),
                    None => AttemptResult::Retryable("unreadable descriptor".to_string()),
                },
                Err(e) => AttemptResult::Retryable(e.without_url().to_string()),
            },
            StatusCode::NOT_FOUND => AttemptResult::Done(ResolveOutcome::NotFound),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                AttemptResult::Done(ResolveOutcome::Denied)
            }
            status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                AttemptResult::Retryable(format!("status {}", status))
            }
            status => {
                warn!("Matching service answered with unexpected status {}", status);
                AttemptResult::Done(ResolveOutcome::Unreachable)
            }
        }
    }

    /// Accepts the JSON descriptor or the plain `Name#TAG,PIN` form
    fn parse_descriptor(&self, body: &str, resolved_for: &str) -> Option<LobbyDescriptor> {
        let body = body.trim();
        if body.starts_with('{') {
            let wire: DescriptorResponse = serde_json::from_str(body).ok()?;
            if wire.lobby_id.is_empty() && wire.host.is_empty() {
                return None;
            }
            return Some(LobbyDescriptor {
                lobby_id: wire.lobby_id,
                host_identity: wire.host,
                expires_at: wire.expires_at,
                join_parameters: wire.join_parameters,
                resolved_for: wire
                    .account_id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| resolved_for.to_string()),
            });
        }

        let (host, pin) = body.split_once(',')?;
        let host = host.trim();
        let (name, tag) = host.split_once('#')?;
        if name.trim().is_empty() || tag.trim().is_empty() {
            return None;
        }

        Some(LobbyDescriptor {
            lobby_id: String::new(),
            host_identity: host.to_string(),
            expires_at: self.clock.now() + self.legacy_ttl,
            join_parameters: json!({ "password": pin.trim() }),
            resolved_for: resolved_for.to_string(),
        })
    }
}

#[async_trait]
impl MatchResolver for HttpMatchResolver {
    async fn resolve(&self, account_identity: &str, password: &Password) -> ResolveOutcome {
        let mut retries = self.retry_delays.iter();

        loop {
            match self.try_resolve(account_identity, password).await {
                AttemptResult::Done(outcome) => {
                    debug!(
                        "Password lookup for account '{}' finished: {}",
                        account_identity,
                        outcome.as_label()
                    );
                    return outcome;
                }
                AttemptResult::Retryable(reason) => match retries.next() {
                    Some(delay) => {
                        warn!(
                            "Matching service unreachable ({}). Retrying in {:?}",
                            reason, delay
                        );
                        sleep(*delay).await;
                    }
                    None => {
                        info!("Matching service unreachable after retries: {}", reason);
                        return ResolveOutcome::Unreachable;
                    }
                },
            }
        }
    }
}
