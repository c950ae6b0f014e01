//! Azure AD client-credentials token acquisition with an expiry-aware cache.

use std::collections::BTreeMap;
use std::time::Duration;

use chatlink_core::{
    current_unix_timestamp, error::truncate_for_error, is_expired_unix, ChatlinkError,
};
use serde::Deserialize;
use tokio::sync::Mutex;

const DEFAULT_AAD_EXPIRES_IN_SECONDS: u64 = 3_600;
/// Cached upstream tokens are refreshed this long before they expire.
pub const TOKEN_EXPIRY_MARGIN_SECONDS: u64 = 60;

#[derive(Debug, Clone)]
pub(crate) struct CachedToken {
    pub(crate) token: String,
    pub(crate) refresh_at_unix: u64,
}

impl CachedToken {
    pub(crate) fn new(token: String, expires_in: Option<u64>, default_expires_in: u64) -> Self {
        let lifetime = expires_in.unwrap_or(default_expires_in);
        Self {
            token,
            refresh_at_unix: current_unix_timestamp()
                .saturating_add(lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN_SECONDS)),
        }
    }

    pub(crate) fn is_fresh(&self, now_unix: u64) -> bool {
        !is_expired_unix(Some(self.refresh_at_unix), now_unix)
    }
}

#[derive(Debug, Deserialize)]
struct AadTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Fetches application tokens from Azure AD.
///
/// Tokens are cached per scope until `expires_in - 60s` (`expires_in`
/// defaults to one hour). Concurrent callers share one in-flight fetch.
pub struct AadTokenProvider {
    http: reqwest::Client,
    authority: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    cache: Mutex<BTreeMap<String, CachedToken>>,
}

impl std::fmt::Debug for AadTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AadTokenProvider")
            .field("authority", &self.authority)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl AadTokenProvider {
    pub fn new(
        authority: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        request_timeout_ms: u64,
    ) -> Result<Self, ChatlinkError> {
        let http = reqwest::Client::builder()
            .user_agent("chatlink-gateway")
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            http,
            authority: authority.trim().trim_end_matches('/').to_string(),
            tenant_id: tenant_id.trim().to_string(),
            client_id: client_id.trim().to_string(),
            client_secret: client_secret.to_string(),
            cache: Mutex::new(BTreeMap::new()),
        })
    }

    fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant_id)
    }

    /// Returns a valid access token for `scope`, fetching one when the cached
    /// token is missing or inside the expiry margin.
    pub async fn access_token(&self, scope: &str) -> Result<String, ChatlinkError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(scope) {
            if cached.is_fresh(current_unix_timestamp()) {
                return Ok(cached.token.clone());
            }
        }

        let response = self
            .http
            .post(self.token_url())
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatlinkError::HttpStatus {
                status: status.as_u16(),
                body: truncate_for_error(&body, 800),
            });
        }
        let parsed = serde_json::from_slice::<AadTokenResponse>(&response.bytes().await?)?;
        if parsed.access_token.trim().is_empty() {
            return Err(ChatlinkError::InvalidCredential(
                "aad returned an empty access token".to_string(),
            ));
        }
        tracing::debug!(
            scope,
            expires_in = parsed.expires_in.unwrap_or(DEFAULT_AAD_EXPIRES_IN_SECONDS),
            "fetched aad access token"
        );
        let cached = CachedToken::new(
            parsed.access_token,
            parsed.expires_in,
            DEFAULT_AAD_EXPIRES_IN_SECONDS,
        );
        let token = cached.token.clone();
        cache.insert(scope.to_string(), cached);
        Ok(token)
    }
}
