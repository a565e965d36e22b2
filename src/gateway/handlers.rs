//! HTTP handlers for the agent routes.

use super::auth::{CallerIdentity, Scope};
use super::GatewayState;
use crate::error::ApiError;
use crate::identity::AgentRecord;
use crate::router::DeliveryReceipt;
use crate::runtime::TerminationReport;
use crate::transport::{ListenAddress, SenderRef};
use crate::types::Did;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub did: Did,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnResponse {
    pub did: Did,
    pub listen_addr: ListenAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    pub action: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Overall delivery deadline, relative to receipt of the request.
    /// Never longer than the gateway's delivery budget.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub receipt: DeliveryReceipt,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentList {
    pub agents: Vec<AgentRecord>,
}

pub async fn livez() -> impl IntoResponse {
    "ok"
}

pub async fn register_agent(
    State(state): State<GatewayState>,
    Extension(caller): Extension<CallerIdentity>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ApiError> {
    caller.require(Scope::AgentsWrite)?;
    let Json(request) = body.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    state.authorize_role(&caller, request.role.trim())?;

    let did = state.directory.create_agent(&request.name, &request.role)?;
    Ok(Json(RegisterResponse { did }))
}

/// Body is the raw descriptor (YAML or JSON).
pub async fn spawn_agent(
    State(state): State<GatewayState>,
    Extension(caller): Extension<CallerIdentity>,
    body: Bytes,
) -> Result<Json<SpawnResponse>, ApiError> {
    caller.require(Scope::AgentsWrite)?;
    let spec = state.directory.load_descriptor(&body)?;
    state.authorize_role(&caller, &spec.role)?;

    let (did, listen_addr) = state.directory.spawn_specification(&spec).await?;
    Ok(Json(SpawnResponse { did, listen_addr }))
}

pub async fn send_message(
    State(state): State<GatewayState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(did): Path<String>,
    body: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    caller.require(Scope::MessagesSend)?;
    let did = parse_did(&did)?;
    let Json(request) = body.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    let budget = request
        .timeout_ms
        .map(Duration::from_millis)
        .map_or(state.delivery_budget, |asked| asked.min(state.delivery_budget));
    let deadline = Instant::now() + budget;
    let receipt = state
        .directory
        .send_message(
            SenderRef::External(caller.caller.clone()),
            &did,
            &request.action,
            request.payload,
            Some(deadline),
        )
        .await?;
    Ok(Json(MessageResponse { receipt }))
}

pub async fn get_agent(
    State(state): State<GatewayState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(did): Path<String>,
) -> Result<Json<AgentRecord>, ApiError> {
    caller.require(Scope::AgentsRead)?;
    let did = parse_did(&did)?;
    Ok(Json(state.directory.resolve(&did)?))
}

pub async fn list_agents(
    State(state): State<GatewayState>,
    Extension(caller): Extension<CallerIdentity>,
    Query(query): Query<ListQuery>,
) -> Result<Json<AgentList>, ApiError> {
    caller.require(Scope::AgentsRead)?;
    let agents = state.directory.list_agents(query.role.as_deref());
    Ok(Json(AgentList { agents }))
}

pub async fn terminate_agent(
    State(state): State<GatewayState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(did): Path<String>,
) -> Result<Json<TerminationReport>, ApiError> {
    caller.require(Scope::AgentsWrite)?;
    let did = parse_did(&did)?;
    Ok(Json(state.directory.terminate_agent(&did).await?))
}

fn parse_did(raw: &str) -> Result<Did, ApiError> {
    Did::parse(raw).ok_or_else(|| ApiError::InvalidRequest(format!("not a DID: {}", raw)))
}
