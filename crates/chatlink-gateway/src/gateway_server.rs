use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, Method};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::aad_auth::AadTokenProvider;
use crate::agent_client::{is_valid_conversation_id, AgentClient};
use crate::GatewayConfig;

mod types;
mod webchat_page;

use types::{ActivitiesQuery, GatewayApiError, TokenResponse};
use webchat_page::render_gateway_webchat_page;

pub const DIRECTLINE_TOKEN_ENDPOINT: &str = "/api/chat/directline/token";
pub const CHAT_TOKEN_ENDPOINT: &str = "/api/chat/token";
pub const CONVERSATIONS_ENDPOINT: &str = "/api/chat/conversations";
pub const CONVERSATION_ACTIVITIES_ENDPOINT: &str = "/api/chat/conversations/{id}/activities";
/// Root that browser and terminal transports use as their Direct Line domain.
pub const DIRECTLINE_DOMAIN: &str = "/api/chat/directline";
const DIRECTLINE_CONVERSATIONS_ENDPOINT: &str = "/api/chat/directline/conversations";
const DIRECTLINE_CONVERSATION_ENDPOINT: &str = "/api/chat/directline/conversations/{id}";
const DIRECTLINE_ACTIVITIES_ENDPOINT: &str = "/api/chat/directline/conversations/{id}/activities";
const WEBCHAT_ENDPOINT: &str = "/webchat";
const HEALTH_ENDPOINT: &str = "/healthz";

#[derive(Clone)]
struct GatewayServerState {
    agent: Arc<AgentClient>,
}

impl GatewayServerState {
    fn new(agent: Arc<AgentClient>) -> Self {
        Self { agent }
    }
}

/// Builds the broker application (routes plus CORS) for `config`.
pub fn build_gateway_app(config: &GatewayConfig) -> Result<Router> {
    config.validate()?;
    let aad = AadTokenProvider::new(
        &config.aad_authority,
        &config.tenant_id,
        &config.client_id,
        &config.client_secret,
        config.upstream_timeout_ms,
    )
    .context("failed to create aad token client")?;
    let agent = AgentClient::new(Arc::new(aad), config)
        .context("failed to create direct line agent client")?;
    let cors = build_cors_layer(&config.cors_origins)?;
    let state = Arc::new(GatewayServerState::new(Arc::new(agent)));
    Ok(build_gateway_router(state).layer(cors))
}

/// Binds the broker on `config.bind` and serves until ctrl-c.
pub async fn run_gateway_server(config: GatewayConfig) -> Result<()> {
    let bind_addr = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --bind '{}'", config.bind))?;
    let app = build_gateway_app(&config)?;

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind chatlink gateway on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound gateway address")?;
    println!(
        "chatlink gateway listening: addr={} webchat={} cors_origins={}",
        local_addr,
        WEBCHAT_ENDPOINT,
        config.cors_origins.join(",")
    );
    tracing::info!(addr = %local_addr, agent_id = %config.agent_id, "chatlink gateway started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("chatlink gateway exited unexpectedly")?;
    tracing::info!("chatlink gateway stopped");
    Ok(())
}

/// Allows GET and POST from the configured origins; `*` allows any origin.
pub fn build_cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let allow_origin = if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let values = origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .with_context(|| format!("invalid cors origin '{origin}'"))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(values)
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any))
}

fn build_gateway_router(state: Arc<GatewayServerState>) -> Router {
    Router::new()
        .route(DIRECTLINE_TOKEN_ENDPOINT, get(handle_directline_token))
        .route(CHAT_TOKEN_ENDPOINT, post(handle_directline_token))
        .route(CONVERSATIONS_ENDPOINT, post(handle_start_conversation))
        .route(
            CONVERSATION_ACTIVITIES_ENDPOINT,
            get(handle_get_activities).post(handle_post_activity),
        )
        .route(
            DIRECTLINE_CONVERSATIONS_ENDPOINT,
            post(handle_start_conversation),
        )
        .route(
            DIRECTLINE_CONVERSATION_ENDPOINT,
            get(handle_reconnect_conversation),
        )
        .route(
            DIRECTLINE_ACTIVITIES_ENDPOINT,
            get(handle_get_activities).post(handle_post_activity),
        )
        .route(WEBCHAT_ENDPOINT, get(handle_webchat_page))
        .route(HEALTH_ENDPOINT, get(handle_health))
        .with_state(state)
}

async fn handle_webchat_page() -> Html<String> {
    Html(render_gateway_webchat_page())
}

async fn handle_health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn handle_directline_token(
    State(state): State<Arc<GatewayServerState>>,
) -> Result<Json<TokenResponse>, GatewayApiError> {
    let token = state
        .agent
        .directline_token()
        .await
        .map_err(|error| GatewayApiError::upstream("directline_token_failed", error))?;
    Ok(Json(TokenResponse { token }))
}

async fn handle_start_conversation(
    State(state): State<Arc<GatewayServerState>>,
) -> Result<Json<Value>, GatewayApiError> {
    let conversation = state
        .agent
        .start_conversation()
        .await
        .map_err(|error| GatewayApiError::upstream("conversation_start_failed", error))?;
    tracing::debug!(
        conversation_id = conversation
            .get("conversationId")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default(),
        "started conversation"
    );
    Ok(Json(conversation))
}

async fn handle_post_activity(
    State(state): State<Arc<GatewayServerState>>,
    Path(conversation_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, GatewayApiError> {
    ensure_conversation_id(&conversation_id)?;
    let activity = serde_json::from_slice::<Value>(&body).map_err(|error| {
        GatewayApiError::bad_request(
            "invalid_activity",
            format!("activity body must be JSON: {error}"),
        )
    })?;
    if !activity.is_object() {
        return Err(GatewayApiError::bad_request(
            "invalid_activity",
            "activity body must be a JSON object",
        ));
    }
    let response = state
        .agent
        .send_activity(&conversation_id, &activity)
        .await
        .map_err(|error| GatewayApiError::upstream("activity_send_failed", error))?;
    Ok(Json(response))
}

async fn handle_reconnect_conversation(
    State(state): State<Arc<GatewayServerState>>,
    Path(conversation_id): Path<String>,
    Query(query): Query<ActivitiesQuery>,
) -> Result<Json<Value>, GatewayApiError> {
    ensure_conversation_id(&conversation_id)?;
    let conversation = state
        .agent
        .reconnect_conversation(&conversation_id, query.watermark.as_deref())
        .await
        .map_err(|error| GatewayApiError::upstream("conversation_reconnect_failed", error))?;
    Ok(Json(conversation))
}

async fn handle_get_activities(
    State(state): State<Arc<GatewayServerState>>,
    Path(conversation_id): Path<String>,
    Query(query): Query<ActivitiesQuery>,
) -> Result<Json<Value>, GatewayApiError> {
    ensure_conversation_id(&conversation_id)?;
    let activities = state
        .agent
        .get_activities(&conversation_id, query.watermark.as_deref())
        .await
        .map_err(|error| GatewayApiError::upstream("activity_fetch_failed", error))?;
    Ok(Json(activities))
}

fn ensure_conversation_id(conversation_id: &str) -> Result<(), GatewayApiError> {
    if is_valid_conversation_id(conversation_id) {
        Ok(())
    } else {
        Err(GatewayApiError::bad_request(
            "invalid_conversation_id",
            format!("conversation id '{conversation_id}' is not valid"),
        ))
    }
}
