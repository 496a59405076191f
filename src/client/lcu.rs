//! HTTP implementation of the local client API
//!
//! Talks to the client's loopback REST endpoint using the port and password
//! from its lockfile. The lockfile is re-read on every request because the
//! client picks a new port and password each time it starts.

use crate::client::api::LocalClientApi;
use crate::client::lockfile::{LockfileInfo, CLIENT_AUTH_USER};
use crate::error::{ClientApiError, ClientResult, LinkError, Result};
use crate::types::{AccountIdentity, AvailableLobby, LobbyId};
use crate::utils::format_identity;
use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

const GAMEFLOW_PHASE: &str = "/lol-gameflow/v1/gameflow-phase";
const CURRENT_SUMMONER: &str = "/lol-summoner/v1/current-summoner";
const REGION_LOCALE: &str = "/riotclient/region-locale";
const CURRENT_LOBBY: &str = "/lol-lobby/v2/lobby";
const CUSTOM_LOBBIES: &str = "/lol-lobby/v2/lobby/custom/available";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummonerResponse {
    game_name: Option<String>,
    tag_line: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegionLocaleResponse {
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomLobbyEntry {
    id: Value,
    #[serde(default)]
    owner_display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientErrorBody {
    message: Option<String>,
}

/// Local client API over HTTP
pub struct LcuHttpClient {
    lockfile_path: PathBuf,
    http: reqwest::Client,
}

impl LcuHttpClient {
    /// Create a client reading connection details from `lockfile_path`
    pub fn new(lockfile_path: PathBuf, request_timeout: Duration) -> Result<Self> {
        // The client serves a self-signed certificate on 127.0.0.1 only
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(request_timeout)
            .build()
            .map_err(|e| LinkError::HttpClientError {
                message: format!("Failed to create local client HTTP client: {}", e),
            })?;

        Ok(Self {
            lockfile_path,
            http,
        })
    }

    async fn connection(&self) -> ClientResult<LockfileInfo> {
        match LockfileInfo::read(&self.lockfile_path).await {
            Ok(Some(info)) => Ok(info),
            Ok(None) => Err(ClientApiError::Unreachable),
            Err(e) => {
                warn!("Ignoring unusable lockfile: {}", e);
                Err(ClientApiError::Unreachable)
            }
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> ClientResult<Response> {
        let info = self.connection().await?;
        let url = format!("{}{}", info.base_url(), path);

        let mut builder = self
            .http
            .request(method.clone(), &url)
            .basic_auth(CLIENT_AUTH_USER, Some(&info.password));
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            let timed_out = e.is_timeout();
            debug!("{} {} failed: {}", method, path, e.without_url());
            if timed_out {
                ClientApiError::Timeout
            } else {
                ClientApiError::Unreachable
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        debug!("{} {} returned {}", method, path, status);
        Err(classify_failure(status, response).await)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.request(Method::GET, path, None)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ClientApiError::Decode {
                reason: format!("{}: {}", path, e.without_url()),
            })
    }
}

async fn classify_failure(status: StatusCode, response: Response) -> ClientApiError {
    match status {
        StatusCode::NOT_FOUND => ClientApiError::NotFound,
        StatusCode::CONFLICT
        | StatusCode::LOCKED
        | StatusCode::TOO_MANY_REQUESTS
        | StatusCode::SERVICE_UNAVAILABLE => ClientApiError::Busy,
        _ => {
            let message = response
                .json::<ClientErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| status.to_string());
            ClientApiError::Refused { message }
        }
    }
}

/// Lobby identity from a lobby document; the client reports numbers or strings
fn lobby_identity(lobby: &Value) -> Option<LobbyId> {
    ["gameId", "id", "partyId"]
        .iter()
        .filter_map(|key| lobby.get(*key))
        .find_map(value_as_id)
}

fn value_as_id(value: &Value) -> Option<LobbyId> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Join body: spectating is always off, resolver parameters fill the rest
fn join_body(join_parameters: &Value) -> Value {
    let mut body = json!({ "asSpectator": false });
    if let (Some(target), Some(extra)) = (body.as_object_mut(), join_parameters.as_object()) {
        for (key, value) in extra {
            if key != "asSpectator" {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    body
}

#[async_trait]
impl LocalClientApi for LcuHttpClient {
    async fn gameflow_phase(&self) -> ClientResult<String> {
        self.get_json::<String>(GAMEFLOW_PHASE).await
    }

    async fn current_account(&self) -> ClientResult<Option<AccountIdentity>> {
        let summoner = match self.get_json::<SummonerResponse>(CURRENT_SUMMONER).await {
            Ok(summoner) => summoner,
            Err(ClientApiError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(match (summoner.game_name, summoner.tag_line) {
            (Some(name), Some(tag)) if !name.is_empty() && !tag.is_empty() => {
                Some(format_identity(&name, &tag))
            }
            _ => None,
        })
    }

    async fn region(&self) -> ClientResult<Option<String>> {
        let locale = self.get_json::<RegionLocaleResponse>(REGION_LOCALE).await?;
        Ok(locale
            .region
            .filter(|region| !region.is_empty())
            .map(|region| region.to_uppercase()))
    }

    async fn current_lobby(&self) -> ClientResult<Option<LobbyId>> {
        match self.get_json::<Value>(CURRENT_LOBBY).await {
            Ok(lobby) => Ok(lobby_identity(&lobby)),
            Err(ClientApiError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn leave_lobby(&self) -> ClientResult<()> {
        match self.request(Method::DELETE, CURRENT_LOBBY, None).await {
            Ok(_) | Err(ClientApiError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn available_lobbies(&self) -> ClientResult<Vec<AvailableLobby>> {
        let entries = self.get_json::<Vec<CustomLobbyEntry>>(CUSTOM_LOBBIES).await?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                value_as_id(&entry.id).map(|id| AvailableLobby {
                    id,
                    owner_display_name: entry.owner_display_name.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn join_lobby(&self, lobby_id: &str, join_parameters: &Value) -> ClientResult<()> {
        let path = format!("/lol-lobby/v2/lobby/custom/{}/join", lobby_id);
        let body = join_body(join_parameters);
        self.request(Method::POST, &path, Some(&body)).await?;
        Ok(())
    }
}
