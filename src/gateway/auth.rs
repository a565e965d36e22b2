//! Bearer credential authentication and scope checks.

use super::GatewayState;
use crate::config::DirectoryConfig;
use crate::error::ApiError;
use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// Caller identity attached to the operator `api.access_key`.
pub const OPERATOR_CALLER: &str = "operator";

/// Permission carried by a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    #[serde(rename = "agents:read")]
    AgentsRead,
    #[serde(rename = "agents:write")]
    AgentsWrite,
    #[serde(rename = "messages:send")]
    MessagesSend,
    /// Register or spawn agents in restricted roles.
    #[serde(rename = "roles:restricted")]
    RolesRestricted,
}

impl Scope {
    pub const ALL: [Scope; 4] = [
        Scope::AgentsRead,
        Scope::AgentsWrite,
        Scope::MessagesSend,
        Scope::RolesRestricted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::AgentsRead => "agents:read",
            Scope::AgentsWrite => "agents:write",
            Scope::MessagesSend => "messages:send",
            Scope::RolesRestricted => "roles:restricted",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct AccessCredential {
    pub caller: String,
    pub scopes: HashSet<Scope>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessCredential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

/// Authenticated caller, inserted into request extensions by `require_credential`.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub caller: String,
    scopes: HashSet<Scope>,
}

impl CallerIdentity {
    pub fn has(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    pub fn require(&self, scope: Scope) -> Result<(), ApiError> {
        if self.has(scope) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "caller '{}' lacks scope {}",
                self.caller, scope
            )))
        }
    }
}

/// Tokens are held only as blake3 digests and compared digest to digest.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    by_digest: HashMap<[u8; 32], AccessCredential>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DirectoryConfig) -> Self {
        let mut store = Self::new();
        if let Some(key) = config.api.access_key.as_deref().filter(|k| !k.is_empty()) {
            store.insert(
                key,
                AccessCredential {
                    caller: OPERATOR_CALLER.to_string(),
                    scopes: Scope::ALL.into_iter().collect(),
                    expires_at: None,
                },
            );
        }
        for credential in &config.credentials {
            store.insert(
                &credential.token,
                AccessCredential {
                    caller: credential.caller.clone(),
                    scopes: credential.scopes.iter().copied().collect(),
                    expires_at: credential.expires_at,
                },
            );
        }
        store
    }

    pub fn insert(&mut self, token: &str, credential: AccessCredential) {
        self.by_digest.insert(digest(token), credential);
    }

    pub fn len(&self) -> usize {
        self.by_digest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_digest.is_empty()
    }

    pub fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<CallerIdentity, ApiError> {
        let credential = self
            .by_digest
            .get(&digest(token))
            .ok_or_else(|| ApiError::Unauthorized("unknown credential".to_string()))?;
        if credential.is_expired(now) {
            return Err(ApiError::Unauthorized("credential expired".to_string()));
        }
        Ok(CallerIdentity {
            caller: credential.caller.clone(),
            scopes: credential.scopes.clone(),
        })
    }
}

fn digest(token: &str) -> [u8; 32] {
    *blake3::hash(token.as_bytes()).as_bytes()
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware guarding every `/agents*` route.
pub async fn require_credential(
    State(state): State<GatewayState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let outcome = bearer(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))
        .and_then(|token| state.credentials.authenticate(token, Utc::now()));

    match outcome {
        Ok(identity) => {
            debug!(caller = %identity.caller, path = %request.uri().path(), "Authenticated request");
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
