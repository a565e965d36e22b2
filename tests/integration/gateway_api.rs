//! HTTP gateway driven in-process with `oneshot`.

use crate::support::node_with;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use maple_directory::config::{CredentialConfig, DirectoryConfig};
use maple_directory::gateway::{build_app, GatewayState, ProblemBody, Scope};
use maple_directory::transport::{ListenAddress, Message, Transport, TransportError};
use maple_directory::AgentDirectory;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const OPERATOR: &str = "operator-key";
const READER: &str = "reader-token";
const FREE_TIER: &str = "free-tier-token";
const EXPIRED: &str = "expired-token";

fn config() -> DirectoryConfig {
    let mut config = DirectoryConfig::ephemeral();
    config.api.access_key = Some(OPERATOR.into());
    config.credentials = vec![
        CredentialConfig {
            token: READER.into(),
            caller: "dashboard".into(),
            scopes: vec![Scope::AgentsRead],
            expires_at: None,
        },
        CredentialConfig {
            token: FREE_TIER.into(),
            caller: "hobbyist".into(),
            scopes: vec![Scope::AgentsRead, Scope::AgentsWrite, Scope::MessagesSend],
            expires_at: None,
        },
        CredentialConfig {
            token: EXPIRED.into(),
            caller: "former".into(),
            scopes: Scope::ALL.to_vec(),
            expires_at: Some(Utc::now() - Duration::minutes(5)),
        },
    ];
    config
}

fn app() -> Router {
    let config = config();
    let directory = Arc::new(node_with(config.clone()).directory);
    build_app(GatewayState::from_config(directory, &config), &config.api)
}

/// Peer that accepts the connection and never acknowledges.
struct SilentPeer;

#[async_trait]
impl Transport for SilentPeer {
    async fn deliver(
        &self,
        _addr: &ListenAddress,
        _message: &Message,
    ) -> Result<String, TransportError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Err(TransportError::Timeout(3_600_000))
    }
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(body).unwrap()
}

fn json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    let mut request = request(method, uri, Some(token), Body::from(body.to_string()));
    request
        .headers_mut()
        .insert("content-type", "application/json".parse().unwrap());
    request
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

fn kind_of(body: &Value) -> String {
    serde_json::from_value::<ProblemBody>(body.clone())
        .unwrap()
        .kind
}

async fn register(app: &Router, token: &str, name: &str, role: &str) -> (StatusCode, Value) {
    call(
        app,
        json_request(
            "POST",
            "/agents/register",
            token,
            json!({"name": name, "role": role}),
        ),
    )
    .await
}

#[tokio::test]
async fn test_livez_needs_no_credential() {
    let app = app();
    let (status, body) = call(&app, request("GET", "/livez", None, Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn test_missing_and_expired_credentials() {
    let app = app();
    let (status, body) = call(&app, request("GET", "/agents", None, Body::empty())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(kind_of(&body), "unauthorized");

    let (status, _) = call(&app, request("GET", "/agents", Some(EXPIRED), Body::empty())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, request("GET", "/agents", Some("bogus"), Body::empty())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_then_get() {
    let app = app();
    let (status, body) = register(&app, OPERATOR, "logistics-bot", "logistics").await;
    assert_eq!(status, StatusCode::OK);
    let did = body["did"].as_str().unwrap().to_string();
    assert!(did.starts_with("did:maple:agent:"));

    let (status, record) = call(
        &app,
        request("GET", &format!("/agents/{}", did), Some(READER), Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["name"], "logistics-bot");
    assert_eq!(record["state"], "registered");
}

#[tokio::test]
async fn test_scope_and_role_authorization() {
    let app = app();

    let (status, body) = register(&app, READER, "bot", "logistics").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(kind_of(&body), "forbidden");

    // premium is restricted by default
    let (status, _) = register(&app, FREE_TIER, "bot", "premium").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = register(&app, FREE_TIER, "bot", "logistics").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = register(&app, OPERATOR, "bot", "premium").await;
    assert_eq!(status, StatusCode::OK);

    let spawn = request(
        "POST",
        "/agents/spawn",
        Some(FREE_TIER),
        Body::from("name: vip\nrole: premium\nbehaviors: [record]\n"),
    );
    let (status, _) = call(&app, spawn).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_spawn_message_terminate() {
    let app = app();
    let spawn = request(
        "POST",
        "/agents/spawn",
        Some(OPERATOR),
        Body::from("name: courier\nrole: logistics\nbehaviors: [record]\n"),
    );
    let (status, body) = call(&app, spawn).await;
    assert_eq!(status, StatusCode::OK);
    let did = body["did"].as_str().unwrap().to_string();
    assert!(body["listen_addr"].as_str().unwrap().starts_with("/ip4/127.0.0.1/tcp/"));

    let message = json!({"action": "ping", "payload": {"from": "gateway"}});
    let (status, body) = call(
        &app,
        json_request("POST", &format!("/agents/{}/message", did), FREE_TIER, message.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["receipt"]["recipient"], did.as_str());
    assert_eq!(body["receipt"]["attempts"], 1);

    let (status, report) = call(
        &app,
        request("POST", &format!("/agents/{}/terminate", did), Some(OPERATOR), Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["did"], did.as_str());

    let (status, body) = call(
        &app,
        json_request("POST", &format!("/agents/{}/message", did), FREE_TIER, message),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(kind_of(&body), "recipient_unavailable");
}

#[tokio::test]
async fn test_descriptor_errors() {
    let app = app();
    let missing_role = request(
        "POST",
        "/agents/spawn",
        Some(OPERATOR),
        Body::from("name: bot\nbehaviors: [record]\n"),
    );
    let (status, body) = call(&app, missing_role).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(kind_of(&body), "schema_violation");

    let garbage = request(
        "POST",
        "/agents/spawn",
        Some(OPERATOR),
        Body::from("name: [unclosed"),
    );
    let (status, body) = call(&app, garbage).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(kind_of(&body), "malformed_descriptor");

    // Nothing was registered along the way
    let (_, list) = call(&app, request("GET", "/agents", Some(READER), Body::empty())).await;
    assert_eq!(list["agents"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_bad_and_unknown_dids() {
    let app = app();
    let (status, body) = call(
        &app,
        request("GET", "/agents/not-a-did", Some(READER), Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(kind_of(&body), "invalid_request");

    let ghost = maple_directory::Did::generate();
    let (status, body) = call(
        &app,
        request("GET", &format!("/agents/{}", ghost), Some(READER), Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(kind_of(&body), "unknown_identity");
}

#[tokio::test]
async fn test_list_filters_by_role() {
    let app = app();
    register(&app, OPERATOR, "a", "logistics").await;
    register(&app, OPERATOR, "b", "logistics").await;
    register(&app, OPERATOR, "c", "billing").await;

    let (status, body) = call(
        &app,
        request("GET", "/agents?role=logistics", Some(READER), Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let agents = body["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 2);
    assert!(agents.iter().all(|a| a["role"] == "logistics"));

    let (_, body) = call(&app, request("GET", "/agents", Some(READER), Body::empty())).await;
    assert_eq!(body["agents"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_terminate_registered_only_conflicts() {
    let app = app();
    let (_, body) = register(&app, OPERATOR, "idle", "logistics").await;
    let did = body["did"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        request("POST", &format!("/agents/{}/terminate", did), Some(OPERATOR), Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(kind_of(&body), "invalid_transition");
}

#[tokio::test]
async fn test_malformed_message_body() {
    let app = app();
    let (_, body) = register(&app, OPERATOR, "idle", "logistics").await;
    let did = body["did"].as_str().unwrap().to_string();

    let mut bad = request(
        "POST",
        &format!("/agents/{}/message", did),
        Some(OPERATOR),
        Body::from("{not json"),
    );
    bad.headers_mut()
        .insert("content-type", "application/json".parse().unwrap());
    let (status, body) = call(&app, bad).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(kind_of(&body), "invalid_request");
}

#[tokio::test]
async fn test_slow_delivery_reports_exhaustion_before_request_timeout() {
    let mut config = config();
    config.api.request_timeout_secs = 1;
    config.router.max_attempts = 10;
    let directory = Arc::new(
        AgentDirectory::builder(config.clone())
            .transport(Arc::new(SilentPeer))
            .build()
            .unwrap(),
    );
    let app = build_app(
        GatewayState::from_config(directory.clone(), &config),
        &config.api,
    );

    let spawn = request(
        "POST",
        "/agents/spawn",
        Some(OPERATOR),
        Body::from("name: mute\nrole: logistics\nbehaviors: [noop]\n"),
    );
    let (_, body) = call(&app, spawn).await;
    let did = body["did"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        json_request(
            "POST",
            &format!("/agents/{}/message", did),
            OPERATOR,
            json!({"action": "ping"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(kind_of(&body), "delivery_exhausted");
    assert_eq!(directory.router_stats().exhausted, 1);

    // A longer caller timeout is capped the same way
    let (status, _) = call(
        &app,
        json_request(
            "POST",
            &format!("/agents/{}/message", did),
            OPERATOR,
            json!({"action": "ping", "timeout_ms": 60_000}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    directory.shutdown().await.unwrap();
}
