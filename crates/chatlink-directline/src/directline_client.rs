//! Direct Line REST calls used by the polling transport.

use std::time::Duration;

use chatlink_core::{error::truncate_for_error, ChatlinkError};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::{Activity, ActivitySet, ConversationStart};

#[derive(Debug, Clone, Deserialize)]
struct ResourceResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Clone)]
/// Thin client over `{domain}/conversations` endpoints.
pub struct DirectLineClient {
    http: reqwest::Client,
    domain: String,
}

impl DirectLineClient {
    pub fn new(domain: &str, request_timeout_ms: u64) -> Result<Self, ChatlinkError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("chatlink-directline"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            http,
            domain: domain.trim().trim_end_matches('/').to_string(),
        })
    }

    pub async fn start_conversation(&self, token: &str) -> Result<ConversationStart, ChatlinkError> {
        let request = self
            .http
            .post(format!("{}/conversations", self.domain))
            .bearer_auth(token);
        self.send_json(request).await
    }

    pub async fn get_activities(
        &self,
        token: &str,
        conversation_id: &str,
        watermark: Option<&str>,
    ) -> Result<ActivitySet, ChatlinkError> {
        let mut request = self
            .http
            .get(self.activities_url(conversation_id))
            .bearer_auth(token);
        if let Some(watermark) = watermark.filter(|value| !value.is_empty()) {
            request = request.query(&[("watermark", watermark)]);
        }
        self.send_json(request).await
    }

    pub async fn post_activity(
        &self,
        token: &str,
        conversation_id: &str,
        activity: &Activity,
    ) -> Result<String, ChatlinkError> {
        let request = self
            .http
            .post(self.activities_url(conversation_id))
            .bearer_auth(token)
            .json(activity);
        let response: ResourceResponse = self.send_json(request).await?;
        response
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ChatlinkError::HttpStatus {
                status: 200,
                body: "activity post response missing id".to_string(),
            })
    }

    fn activities_url(&self, conversation_id: &str) -> String {
        format!("{}/conversations/{conversation_id}/activities", self.domain)
    }

    async fn send_json<T>(&self, request: reqwest::RequestBuilder) -> Result<T, ChatlinkError>
    where
        T: DeserializeOwned,
    {
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
        Ok(serde_json::from_slice::<T>(&bytes)?)
    }
}
