//! Credential fetches against the token broker.

use std::time::Duration;

use async_trait::async_trait;
use chatlink_core::{error::truncate_for_error, ChatlinkError, Credential};

pub const DIRECTLINE_TOKEN_PATH: &str = "/api/chat/directline/token";
pub const CONVERSATIONS_PATH: &str = "/api/chat/conversations";

#[async_trait]
/// Source of fresh credentials for a chat transport.
pub trait TokenProvider: Send + Sync {
    async fn obtain_credential(&self) -> Result<Credential, ChatlinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which broker endpoint issues the credential.
pub enum TokenEndpoint {
    /// `GET /api/chat/directline/token` returning `{token}`.
    DirectLineToken,
    /// `POST /api/chat/conversations` returning `{token, conversationId}`.
    Conversation,
}

impl TokenEndpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::DirectLineToken => DIRECTLINE_TOKEN_PATH,
            Self::Conversation => CONVERSATIONS_PATH,
        }
    }
}

#[derive(Debug, Clone)]
/// Fetches credentials from a chatlink gateway over HTTP.
///
/// Each call issues exactly one request; failures are returned to the caller
/// without retry.
pub struct HttpTokenProvider {
    http: reqwest::Client,
    base_url: String,
    endpoint: TokenEndpoint,
}

impl HttpTokenProvider {
    /// `request_timeout_ms == 0` leaves the request without a client timeout.
    pub fn new(
        base_url: &str,
        endpoint: TokenEndpoint,
        request_timeout_ms: u64,
    ) -> Result<Self, ChatlinkError> {
        let mut builder = reqwest::Client::builder().user_agent("chatlink-session");
        if request_timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(request_timeout_ms));
        }
        Ok(Self {
            http: builder.build()?,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> TokenEndpoint {
        self.endpoint
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, self.endpoint.path())
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn obtain_credential(&self) -> Result<Credential, ChatlinkError> {
        let request = match self.endpoint {
            TokenEndpoint::DirectLineToken => self.http.get(self.url()),
            TokenEndpoint::Conversation => self.http.post(self.url()),
        };
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatlinkError::HttpStatus {
                status: status.as_u16(),
                body: truncate_for_error(&body, 800),
            });
        }
        let bytes = response.bytes().await?;
        let credential = Credential::from_json_slice(&bytes)?;
        tracing::debug!(
            endpoint = self.endpoint.path(),
            has_conversation = credential.conversation_id.is_some(),
            "obtained chat credential"
        );
        Ok(credential)
    }
}
