//! API Gateway
//!
//! Authenticated HTTP surface over `AgentDirectory`. Every `/agents*` route
//! requires a bearer credential; `/livez` does not.

pub mod auth;
pub mod handlers;
pub mod problem;

pub use auth::{AccessCredential, CallerIdentity, CredentialStore, Scope};
pub use problem::ProblemBody;

use crate::config::{ApiConfig, DirectoryConfig};
use crate::directory::AgentDirectory;
use crate::error::ApiError;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Delivery budgets end this long before the request timeout.
const DELIVERY_MARGIN: Duration = Duration::from_millis(250);

/// Shared handler state.
#[derive(Clone)]
pub struct GatewayState {
    pub directory: Arc<AgentDirectory>,
    pub credentials: Arc<CredentialStore>,
    pub restricted_roles: Arc<HashSet<String>>,
    /// Upper bound on one `send_message` call.
    pub delivery_budget: Duration,
}

impl GatewayState {
    pub fn new(
        directory: Arc<AgentDirectory>,
        credentials: CredentialStore,
        restricted_roles: impl IntoIterator<Item = String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            credentials: Arc::new(credentials),
            restricted_roles: Arc::new(restricted_roles.into_iter().collect()),
            delivery_budget: delivery_budget(request_timeout),
        }
    }

    pub fn from_config(directory: Arc<AgentDirectory>, config: &DirectoryConfig) -> Self {
        Self::new(
            directory,
            CredentialStore::from_config(config),
            config.api.restricted_roles.clone(),
            Duration::from_secs(config.api.request_timeout_secs),
        )
    }

    /// Restricted roles need `roles:restricted` on top of the route's scope.
    pub fn authorize_role(&self, caller: &CallerIdentity, role: &str) -> Result<(), ApiError> {
        if self.restricted_roles.contains(role) && !caller.has(Scope::RolesRestricted) {
            return Err(ApiError::Forbidden(format!(
                "role '{}' requires scope {}",
                role,
                Scope::RolesRestricted
            )));
        }
        Ok(())
    }
}

fn delivery_budget(request_timeout: Duration) -> Duration {
    match request_timeout.checked_sub(DELIVERY_MARGIN) {
        Some(budget) if !budget.is_zero() => budget,
        _ => request_timeout / 2,
    }
}

pub fn build_app(state: GatewayState, api: &ApiConfig) -> Router {
    let agent_routes = Router::new()
        .route("/agents", get(handlers::list_agents))
        .route("/agents/register", post(handlers::register_agent))
        .route("/agents/spawn", post(handlers::spawn_agent))
        .route("/agents/{did}", get(handlers::get_agent))
        .route("/agents/{did}/message", post(handlers::send_message))
        .route("/agents/{did}/terminate", post(handlers::terminate_agent))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_credential,
        ))
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(api.request_timeout_secs),
        ))
        .layer(DefaultBodyLimit::max(api.max_body_bytes))
        .layer(ConcurrencyLimitLayer::new(api.max_connections));

    Router::new()
        .route("/livez", get(handlers::livez))
        .merge(agent_routes)
        .layer(TraceLayer::new_for_http())
}

/// Serve the gateway until `shutdown` resolves.
pub async fn serve<F>(
    config: &DirectoryConfig,
    directory: Arc<AgentDirectory>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = GatewayState::from_config(directory, config);
    if state.credentials.is_empty() {
        tracing::warn!("No credentials configured; every /agents request will be rejected");
    }
    let app = build_app(state, &config.api);

    let listener = tokio::net::TcpListener::bind(&config.api.bind).await?;
    info!(
        bind = %listener.local_addr()?,
        base_url = %config.api.base_url,
        "Gateway listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
