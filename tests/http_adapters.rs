//! HTTP adapter tests against in-process fake servers
//!
//! The local client and the matching service are both stood in for by small
//! axum routers bound to an ephemeral loopback port.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use league_link::client::{ClientProbe, LcuHttpClient, LocalClientApi};
use league_link::config::ResolverSettings;
use league_link::error::ClientApiError;
use league_link::registration::{AccountVerifier, RegistrationSource, SettingsFileRegistration};
use league_link::resolver::{HttpMatchResolver, MatchResolver, ResolveOutcome};
use league_link::types::{AvailableLobby, GamePhase, Password};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

// Local client fake

#[derive(Clone, Default)]
struct LocalClientFake {
    joins: Arc<Mutex<Vec<(String, Value)>>>,
    leaves: Arc<AtomicUsize>,
    auth_headers: Arc<Mutex<Vec<String>>>,
}

async fn fake_leave(State(fake): State<LocalClientFake>) -> StatusCode {
    fake.leaves.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn fake_join(
    State(fake): State<LocalClientFake>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        fake.auth_headers.lock().unwrap().push(auth.to_string());
    }

    match id.as_str() {
        "busy" => StatusCode::CONFLICT.into_response(),
        "full" => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Lobby is full" })),
        )
            .into_response(),
        "gone" => StatusCode::NOT_FOUND.into_response(),
        _ => {
            fake.joins.lock().unwrap().push((id, body));
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

fn local_client_router(fake: LocalClientFake) -> Router {
    Router::new()
        .route(
            "/lol-gameflow/v1/gameflow-phase",
            get(|| async { Json("Lobby") }),
        )
        .route(
            "/lol-summoner/v1/current-summoner",
            get(|| async { Json(json!({ "gameName": "Player", "tagLine": "EUW" })) }),
        )
        .route(
            "/riotclient/region-locale",
            get(|| async { Json(json!({ "region": "euw", "locale": "en_GB" })) }),
        )
        .route(
            "/lol-lobby/v2/lobby",
            get(|| async { Json(json!({ "gameConfig": {}, "gameId": 42 })) }).delete(fake_leave),
        )
        .route(
            "/lol-lobby/v2/lobby/custom/available",
            get(|| async {
                Json(json!([
                    { "id": 77, "ownerDisplayName": "Host#EUW" },
                    { "id": "L9", "ownerDisplayName": "Other#NA1" },
                    { "id": null, "ownerDisplayName": "Broken#EUW" }
                ]))
            }),
        )
        .route("/lol-lobby/v2/lobby/custom/{id}/join", post(fake_join))
        .with_state(fake)
}

/// Start the fake client and write a lockfile pointing at it
async fn running_local_client() -> (LocalClientFake, LcuHttpClient, TempDir) {
    let fake = LocalClientFake::default();
    let addr = serve(local_client_router(fake.clone())).await;

    let dir = tempfile::tempdir().unwrap();
    let lockfile = dir.path().join("lockfile");
    std::fs::write(
        &lockfile,
        format!("LeagueClient:4242:{}:s3cret:http", addr.port()),
    )
    .unwrap();

    let client = LcuHttpClient::new(lockfile, Duration::from_secs(2)).unwrap();
    (fake, client, dir)
}

#[tokio::test]
async fn test_local_client_reads_session() {
    let (_fake, client, _dir) = running_local_client().await;

    assert_eq!(client.gameflow_phase().await.unwrap(), "Lobby");
    assert_eq!(
        client.current_account().await.unwrap().as_deref(),
        Some("Player#EUW")
    );
    assert_eq!(client.region().await.unwrap().as_deref(), Some("EUW"));
    assert_eq!(client.current_lobby().await.unwrap().as_deref(), Some("42"));

    let lobbies = client.available_lobbies().await.unwrap();
    assert_eq!(
        lobbies,
        vec![
            AvailableLobby {
                id: "77".to_string(),
                owner_display_name: "Host#EUW".to_string(),
            },
            AvailableLobby {
                id: "L9".to_string(),
                owner_display_name: "Other#NA1".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn test_local_client_join_body_and_auth() {
    let (fake, client, _dir) = running_local_client().await;

    client
        .join_lobby("77", &json!({ "password": "4321", "asSpectator": true }))
        .await
        .unwrap();

    let joins = fake.joins.lock().unwrap().clone();
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].0, "77");
    assert_eq!(joins[0].1, json!({ "asSpectator": false, "password": "4321" }));

    let auth = fake.auth_headers.lock().unwrap().clone();
    assert_eq!(auth.len(), 1);
    assert!(auth[0].starts_with("Basic "));
}

#[tokio::test]
async fn test_local_client_action_failures() {
    let (_fake, client, _dir) = running_local_client().await;

    assert_eq!(
        client.join_lobby("busy", &json!({})).await,
        Err(ClientApiError::Busy)
    );
    assert_eq!(
        client.join_lobby("gone", &json!({})).await,
        Err(ClientApiError::NotFound)
    );
    assert_eq!(
        client.join_lobby("full", &json!({})).await,
        Err(ClientApiError::Refused {
            message: "Lobby is full".to_string()
        })
    );
}

#[tokio::test]
async fn test_local_client_leave() {
    let (fake, client, _dir) = running_local_client().await;

    client.leave_lobby().await.unwrap();
    assert_eq!(fake.leaves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stale_lockfile_is_unreachable() {
    // Take a free port and release it so nothing answers there
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    let lockfile = dir.path().join("lockfile");
    std::fs::write(&lockfile, format!("LeagueClient:1:{}:pw:http", port)).unwrap();
    let client = LcuHttpClient::new(lockfile, Duration::from_secs(1)).unwrap();

    assert_eq!(
        client.gameflow_phase().await,
        Err(ClientApiError::Unreachable)
    );
}

#[tokio::test]
async fn test_probe_over_http() {
    let (_fake, client, _dir) = running_local_client().await;
    let probe = ClientProbe::new(Arc::new(client), Duration::from_secs(2));

    let outcome = probe.poll().await;

    assert!(outcome.diagnostics.is_empty());
    assert!(outcome.session.present);
    assert_eq!(outcome.session.phase, GamePhase::Lobby);
    assert_eq!(outcome.session.lobby_id.as_deref(), Some("42"));
    assert_eq!(
        outcome.session.account_identity.as_deref(),
        Some("Player#EUW")
    );
}

// Matching service fake

#[derive(Clone, Default)]
struct MatchingServiceFake {
    calls: Arc<AtomicUsize>,
}

async fn fake_joinmatch(State(fake): State<MatchingServiceFake>, Json(body): Json<Value>) -> Response {
    let call = fake.calls.fetch_add(1, Ordering::SeqCst);
    if body["account_id"] != "acct-1" {
        return StatusCode::BAD_REQUEST.into_response();
    }

    match body["password"].as_str().unwrap_or_default() {
        "json" => Json(json!({
            "lobby_id": "L123",
            "host": "Host#EUW",
            "expires_at": "2030-01-01T00:00:00Z",
            "join_parameters": { "password": "9999" }
        }))
        .into_response(),
        "legacy" => "Host#EUW,4321".into_response(),
        "foreign" => Json(json!({
            "lobby_id": "L123",
            "host": "Host#EUW",
            "expires_at": "2030-01-01T00:00:00Z",
            "account_id": "acct-2"
        }))
        .into_response(),
        "denied" => StatusCode::FORBIDDEN.into_response(),
        "flaky" if call == 0 => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        "flaky" => Json(json!({
            "lobby_id": "L7",
            "host": "Host#EUW",
            "expires_at": "2030-01-01T00:00:00Z"
        }))
        .into_response(),
        "down" => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        "garbled" => "<html>maintenance</html>".into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn fake_auth(Query(params): Query<HashMap<String, String>>) -> StatusCode {
    match params.get("discord_id").map(String::as_str) {
        Some("known") => StatusCode::OK,
        Some("gone") => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn matching_service() -> (MatchingServiceFake, ResolverSettings) {
    let fake = MatchingServiceFake::default();
    let router = Router::new()
        .route("/joinmatch", post(fake_joinmatch))
        .route("/auth", get(fake_auth))
        .with_state(fake.clone());
    let addr = serve(router).await;

    let settings = ResolverSettings {
        base_url: format!("http://{}", addr),
        request_timeout_ms: 2000,
        retry_delays_ms: vec![10, 10],
        ..ResolverSettings::default()
    };
    (fake, settings)
}

#[tokio::test]
async fn test_resolver_json_descriptor() {
    let (_fake, settings) = matching_service().await;
    let resolver = HttpMatchResolver::new(&settings).unwrap();

    match resolver.resolve("acct-1", &Password::new("json")).await {
        ResolveOutcome::Resolved(descriptor) => {
            assert_eq!(descriptor.lobby_id, "L123");
            assert_eq!(descriptor.host_identity, "Host#EUW");
            assert_eq!(descriptor.join_parameters["password"], "9999");
            assert_eq!(descriptor.resolved_for, "acct-1");
        }
        other => panic!("expected a descriptor, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resolver_reports_answering_account() {
    let (_fake, settings) = matching_service().await;
    let resolver = HttpMatchResolver::new(&settings).unwrap();

    match resolver.resolve("acct-1", &Password::new("foreign")).await {
        ResolveOutcome::Resolved(descriptor) => assert_eq!(descriptor.resolved_for, "acct-2"),
        other => panic!("expected a descriptor, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resolver_legacy_descriptor() {
    let (_fake, settings) = matching_service().await;
    let resolver = HttpMatchResolver::new(&settings).unwrap();

    match resolver.resolve("acct-1", &Password::new("legacy")).await {
        ResolveOutcome::Resolved(descriptor) => {
            assert!(descriptor.lobby_id.is_empty());
            assert_eq!(descriptor.host_identity, "Host#EUW");
            assert_eq!(descriptor.join_parameters["password"], "4321");
        }
        other => panic!("expected a descriptor, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resolver_terminal_answers_are_not_retried() {
    let (fake, settings) = matching_service().await;
    let resolver = HttpMatchResolver::new(&settings).unwrap();

    assert_eq!(
        resolver.resolve("acct-1", &Password::new("nope")).await,
        ResolveOutcome::NotFound
    );
    assert_eq!(
        resolver.resolve("acct-1", &Password::new("denied")).await,
        ResolveOutcome::Denied
    );
    assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_resolver_retries_server_errors() {
    let (fake, settings) = matching_service().await;
    let resolver = HttpMatchResolver::new(&settings).unwrap();

    match resolver.resolve("acct-1", &Password::new("flaky")).await {
        ResolveOutcome::Resolved(descriptor) => assert_eq!(descriptor.lobby_id, "L7"),
        other => panic!("expected a descriptor, got {:?}", other),
    }
    assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_resolver_gives_up_after_bounded_retries() {
    let (fake, settings) = matching_service().await;
    let resolver = HttpMatchResolver::new(&settings).unwrap();

    assert_eq!(
        resolver.resolve("acct-1", &Password::new("down")).await,
        ResolveOutcome::Unreachable
    );
    assert_eq!(fake.calls.load(Ordering::SeqCst), 3);

    assert_eq!(
        resolver.resolve("acct-1", &Password::new("garbled")).await,
        ResolveOutcome::Unreachable
    );
    assert_eq!(fake.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_registration_verified_against_service() {
    let (_fake, settings) = matching_service().await;
    let dir = tempfile::tempdir().unwrap();

    let registration_for = |account: &str| {
        let path = dir.path().join(format!("{}.toml", account));
        std::fs::write(&path, format!("account_id = \"{}\"\n", account)).unwrap();
        SettingsFileRegistration::new(path, Some(AccountVerifier::new(&settings).unwrap()))
    };

    let known = registration_for("known").registration_status().await;
    assert!(known.registered);
    assert_eq!(known.account_identity.as_deref(), Some("known"));

    let gone = registration_for("gone").registration_status().await;
    assert!(!gone.registered);

    // No definite answer from the service keeps the stored registration
    let flaky = registration_for("other").registration_status().await;
    assert!(flaky.registered);
}
