//! Direct Line calls made on behalf of browser and terminal clients.

use std::sync::Arc;
use std::time::Duration;

use chatlink_core::{current_unix_timestamp, error::truncate_for_error, ChatlinkError};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::aad_auth::{AadTokenProvider, CachedToken};
use crate::GatewayConfig;

const DEFAULT_DIRECTLINE_EXPIRES_IN_SECONDS: u64 = 1_800;
const DIRECTLINE_API_PATH: &str = "/v3/directline";

#[derive(Debug, Deserialize)]
struct DirectLineTokenResponse {
    token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Talks to the agent's token endpoint and the Direct Line REST API.
///
/// The Direct Line token is exchanged for an AAD bearer and cached until
/// `expires_in - 60s` (`expires_in` defaults to 30 minutes). Every Direct Line
/// request carries the cached token.
#[derive(Debug)]
pub struct AgentClient {
    http: reqwest::Client,
    aad: Arc<AadTokenProvider>,
    scope: String,
    agent_id: String,
    environment_id: String,
    token_endpoint: String,
    directline_base: String,
    token_cache: Mutex<Option<CachedToken>>,
}

impl AgentClient {
    pub fn new(aad: Arc<AadTokenProvider>, config: &GatewayConfig) -> Result<Self, ChatlinkError> {
        let http = reqwest::Client::builder()
            .user_agent("chatlink-gateway")
            .timeout(Duration::from_millis(config.upstream_timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            http,
            aad,
            scope: config.aad_scope(),
            agent_id: config.agent_id.trim().to_string(),
            environment_id: config.environment_id.trim().to_string(),
            token_endpoint: config.token_endpoint.trim().to_string(),
            directline_base: format!(
                "{}{}",
                config.directline_endpoint.trim().trim_end_matches('/'),
                DIRECTLINE_API_PATH
            ),
            token_cache: Mutex::new(None),
        })
    }

    /// Returns a Direct Line token, refreshing it when the cached one is
    /// missing or inside the expiry margin.
    pub async fn directline_token(&self) -> Result<String, ChatlinkError> {
        let mut cache = self.token_cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.is_fresh(current_unix_timestamp()) {
                return Ok(cached.token.clone());
            }
        }

        let aad_token = self.aad.access_token(&self.scope).await?;
        let response = self
            .http
            .get(&self.token_endpoint)
            .bearer_auth(aad_token)
            .query(&[
                ("agentId", self.agent_id.as_str()),
                ("environmentId", self.environment_id.as_str()),
            ])
            .send()
            .await?;
        let bytes = read_success_body(response).await?;
        let parsed = serde_json::from_slice::<DirectLineTokenResponse>(&bytes)?;
        if parsed.token.trim().is_empty() {
            return Err(ChatlinkError::InvalidCredential(
                "token endpoint returned an empty direct line token".to_string(),
            ));
        }
        tracing::info!(
            agent_id = %self.agent_id,
            expires_in = parsed.expires_in.unwrap_or(DEFAULT_DIRECTLINE_EXPIRES_IN_SECONDS),
            "issued direct line token"
        );
        let cached = CachedToken::new(
            parsed.token,
            parsed.expires_in,
            DEFAULT_DIRECTLINE_EXPIRES_IN_SECONDS,
        );
        let token = cached.token.clone();
        *cache = Some(cached);
        Ok(token)
    }

    /// Starts a conversation and returns the upstream payload unchanged
    /// (`conversationId`, `token`, `expires_in`, `streamUrl`).
    pub async fn start_conversation(&self) -> Result<Value, ChatlinkError> {
        let url = format!("{}/conversations", self.directline_base);
        self.send_json(Method::POST, &url, None, None).await
    }

    /// Resumes an existing conversation; Direct Line answers with a fresh
    /// `streamUrl` for the same `conversationId`.
    pub async fn reconnect_conversation(
        &self,
        conversation_id: &str,
        watermark: Option<&str>,
    ) -> Result<Value, ChatlinkError> {
        let url = format!("{}/conversations/{}", self.directline_base, conversation_id);
        let watermark = watermark.filter(|value| !value.is_empty());
        self.send_json(Method::GET, &url, watermark, None).await
    }

    pub async fn send_activity(
        &self,
        conversation_id: &str,
        activity: &Value,
    ) -> Result<Value, ChatlinkError> {
        let url = self.activities_url(conversation_id);
        self.send_json(Method::POST, &url, None, Some(activity)).await
    }

    /// Reads activities after `watermark`; an empty watermark reads from the
    /// start of the conversation.
    pub async fn get_activities(
        &self,
        conversation_id: &str,
        watermark: Option<&str>,
    ) -> Result<Value, ChatlinkError> {
        let url = self.activities_url(conversation_id);
        let watermark = watermark.filter(|value| !value.is_empty());
        self.send_json(Method::GET, &url, watermark, None).await
    }

    fn activities_url(&self, conversation_id: &str) -> String {
        format!(
            "{}/conversations/{}/activities",
            self.directline_base, conversation_id
        )
    }

    async fn send_json(
        &self,
        method: Method,
        url: &str,
        watermark: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Value, ChatlinkError> {
        let token = self.directline_token().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(watermark) = watermark {
            request = request.query(&[("watermark", watermark)]);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let bytes = read_success_body(request.send().await?).await?;
        Ok(serde_json::from_slice::<Value>(&bytes)?)
    }
}

async fn read_success_body(response: reqwest::Response) -> Result<Vec<u8>, ChatlinkError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ChatlinkError::HttpStatus {
            status: status.as_u16(),
            body: truncate_for_error(&body, 800),
        });
    }
    Ok(response.bytes().await?.to_vec())
}

/// Conversation ids are interpolated into upstream paths, so only the
/// characters Direct Line issues are accepted.
pub fn is_valid_conversation_id(conversation_id: &str) -> bool {
    !conversation_id.is_empty()
        && conversation_id.len() <= 256
        && conversation_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '|' | ':'))
}
