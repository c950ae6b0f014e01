//! Token broker configuration and client secret resolution.

use std::path::Path;

use anyhow::{bail, Context, Result};

pub const DEFAULT_GATEWAY_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_DIRECTLINE_ENDPOINT: &str = "https://directline.botframework.com";
pub const DEFAULT_AAD_AUTHORITY: &str = "https://login.microsoftonline.com";
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone, PartialEq, Eq)]
/// Settings for `run_gateway_server`.
pub struct GatewayConfig {
    pub bind: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub agent_id: String,
    pub environment_id: String,
    pub resource_app_id: String,
    pub directline_endpoint: String,
    pub token_endpoint: String,
    pub aad_authority: String,
    pub cors_origins: Vec<String>,
    pub upstream_timeout_ms: u64,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("bind", &self.bind)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("agent_id", &self.agent_id)
            .field("environment_id", &self.environment_id)
            .field("resource_app_id", &self.resource_app_id)
            .field("directline_endpoint", &self.directline_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("aad_authority", &self.aad_authority)
            .field("cors_origins", &self.cors_origins)
            .field("upstream_timeout_ms", &self.upstream_timeout_ms)
            .finish()
    }
}

impl GatewayConfig {
    /// OAuth scope requested from AAD for the agent's resource application.
    pub fn aad_scope(&self) -> String {
        format!("api://{}/.default", self.resource_app_id.trim())
    }

    /// Rejects configurations that could never obtain a Direct Line token.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("--tenant-id", &self.tenant_id),
            ("--client-id", &self.client_id),
            ("--client-secret", &self.client_secret),
            ("--agent-id", &self.agent_id),
            ("--environment-id", &self.environment_id),
            ("--resource-app-id", &self.resource_app_id),
            ("--token-endpoint", &self.token_endpoint),
            ("--directline-endpoint", &self.directline_endpoint),
            ("--aad-authority", &self.aad_authority),
        ];
        let missing = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(flag, _)| *flag)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            bail!("missing gateway configuration: {}", missing.join(", "));
        }
        if self.upstream_timeout_ms == 0 {
            bail!("upstream timeout must be greater than 0");
        }
        Ok(())
    }
}

/// Splits a comma separated origin list; blank entries are dropped and an
/// empty result falls back to `*`.
pub fn parse_cors_origins(raw: &str) -> Vec<String> {
    let origins = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    if origins.is_empty() {
        vec!["*".to_string()]
    } else {
        origins
    }
}

/// Resolves the AAD client secret. A secret file wins over the inline value;
/// trailing whitespace in the file is ignored.
pub fn resolve_client_secret(inline: Option<&str>, file: Option<&Path>) -> Result<String> {
    if let Some(path) = file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read client secret file {}", path.display()))?;
        let secret = raw.trim_end().to_string();
        if secret.is_empty() {
            bail!("client secret file {} is empty", path.display());
        }
        return Ok(secret);
    }
    Ok(inline.map(str::trim).unwrap_or_default().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_config() -> GatewayConfig {
        GatewayConfig {
            bind: DEFAULT_GATEWAY_BIND.to_string(),
            tenant_id: "tenant".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            agent_id: "agent".to_string(),
            environment_id: "env".to_string(),
            resource_app_id: "res-app".to_string(),
            directline_endpoint: DEFAULT_DIRECTLINE_ENDPOINT.to_string(),
            token_endpoint: "https://tokens.example/issue".to_string(),
            aad_authority: DEFAULT_AAD_AUTHORITY.to_string(),
            cors_origins: vec!["*".to_string()],
            upstream_timeout_ms: DEFAULT_UPSTREAM_TIMEOUT_MS,
        }
    }

    #[test]
    fn unit_aad_scope_targets_resource_app() {
        assert_eq!(sample_config().aad_scope(), "api://res-app/.default");
    }

    #[test]
    fn unit_validate_lists_every_missing_field() {
        let mut config = sample_config();
        config.tenant_id = " ".to_string();
        config.token_endpoint.clear();
        let error = config.validate().expect_err("should fail");
        let message = error.to_string();
        assert!(message.contains("--tenant-id"));
        assert!(message.contains("--token-endpoint"));
        assert!(!message.contains("--client-id"));
    }

    #[test]
    fn unit_debug_output_redacts_client_secret() {
        let rendered = format!("{:?}", sample_config());
        assert!(!rendered.contains("secret\""));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn unit_parse_cors_origins_splits_and_defaults_to_wildcard() {
        assert_eq!(
            parse_cors_origins("https://a.example, https://b.example,"),
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(parse_cors_origins(" , "), vec!["*"]);
    }

    #[test]
    fn functional_secret_file_wins_over_inline_value() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("secret.txt");
        std::fs::write(&path, "from-file\n").expect("write secret");
        let secret = resolve_client_secret(Some("inline"), Some(&path)).expect("secret");
        assert_eq!(secret, "from-file");
        assert_eq!(
            resolve_client_secret(Some(" inline "), None).expect("inline"),
            "inline"
        );
    }

    #[test]
    fn regression_empty_secret_file_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("secret.txt");
        std::fs::write(&path, "\n").expect("write secret");
        assert!(resolve_client_secret(None, Some(&path)).is_err());
        assert!(resolve_client_secret(None, Some(&temp.path().join("missing"))).is_err());
    }
}
