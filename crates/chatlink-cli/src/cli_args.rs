use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chatlink_gateway::{
    parse_cors_origins, resolve_client_secret, GatewayConfig, DEFAULT_AAD_AUTHORITY,
    DEFAULT_DIRECTLINE_ENDPOINT, DEFAULT_GATEWAY_BIND, DEFAULT_UPSTREAM_TIMEOUT_MS,
    DIRECTLINE_DOMAIN,
};
use chatlink_session::{
    RefreshStrategy, TokenEndpoint, DEFAULT_REFRESH_INTERVAL, MAX_REFRESH_INTERVAL,
};
use clap::{Args, Parser, Subcommand, ValueEnum};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_refresh_interval_minutes(value: &str) -> Result<u64, String> {
    let parsed = parse_positive_u64(value)?;
    let max_minutes = MAX_REFRESH_INTERVAL.as_secs() / 60;
    if parsed > max_minutes {
        return Err(format!("value must be at most {max_minutes} minutes"));
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "chatlink",
    about = "Direct Line token broker and terminal chat client",
    version
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub(crate) enum CliCommand {
    /// Run the token broker gateway.
    Serve(ServeArgs),
    /// Chat with the agent from the terminal through a running gateway.
    Chat(ChatArgs),
}

#[derive(Debug, Args)]
pub(crate) struct ServeArgs {
    #[arg(
        long,
        env = "CHATLINK_BIND",
        default_value = DEFAULT_GATEWAY_BIND,
        help = "Socket address the gateway listens on"
    )]
    pub(crate) bind: String,

    #[arg(long = "tenant-id", env = "TENANT_ID", default_value = "")]
    pub(crate) tenant_id: String,

    #[arg(long = "client-id", env = "CLIENT_ID", default_value = "")]
    pub(crate) client_id: String,

    #[arg(
        long = "client-secret",
        env = "CLIENT_SECRET",
        hide_env_values = true,
        help = "AAD application secret; prefer --client-secret-file outside development"
    )]
    pub(crate) client_secret: Option<String>,

    #[arg(
        long = "client-secret-file",
        env = "CLIENT_SECRET_FILE",
        help = "File holding the AAD application secret; wins over --client-secret"
    )]
    pub(crate) client_secret_file: Option<PathBuf>,

    #[arg(long = "agent-id", env = "AGENT_ID", default_value = "")]
    pub(crate) agent_id: String,

    #[arg(long = "environment-id", env = "ENVIRONMENT_ID", default_value = "")]
    pub(crate) environment_id: String,

    #[arg(long = "resource-app-id", env = "RESOURCE_APP_ID", default_value = "")]
    pub(crate) resource_app_id: String,

    #[arg(
        long = "directline-endpoint",
        env = "DIRECTLINE_ENDPOINT",
        default_value = DEFAULT_DIRECTLINE_ENDPOINT
    )]
    pub(crate) directline_endpoint: String,

    #[arg(
        long = "token-endpoint",
        env = "TOKEN_ENDPOINT",
        default_value = "",
        help = "Agent token endpoint exchanging an AAD bearer for a Direct Line token"
    )]
    pub(crate) token_endpoint: String,

    #[arg(
        long = "aad-authority",
        env = "AAD_AUTHORITY",
        default_value = DEFAULT_AAD_AUTHORITY
    )]
    pub(crate) aad_authority: String,

    #[arg(
        long = "cors-origins",
        env = "CORS_ORIGINS",
        default_value = "*",
        help = "Comma separated list of allowed browser origins"
    )]
    pub(crate) cors_origins: String,

    #[arg(
        long = "upstream-timeout-ms",
        env = "CHATLINK_UPSTREAM_TIMEOUT_MS",
        default_value_t = DEFAULT_UPSTREAM_TIMEOUT_MS,
        value_parser = parse_positive_u64
    )]
    pub(crate) upstream_timeout_ms: u64,
}

impl ServeArgs {
    pub(crate) fn to_gateway_config(&self) -> Result<GatewayConfig> {
        let client_secret = resolve_client_secret(
            self.client_secret.as_deref(),
            self.client_secret_file.as_deref(),
        )?;
        Ok(GatewayConfig {
            bind: self.bind.trim().to_string(),
            tenant_id: self.tenant_id.trim().to_string(),
            client_id: self.client_id.trim().to_string(),
            client_secret,
            agent_id: self.agent_id.trim().to_string(),
            environment_id: self.environment_id.trim().to_string(),
            resource_app_id: self.resource_app_id.trim().to_string(),
            directline_endpoint: self.directline_endpoint.trim().to_string(),
            token_endpoint: self.token_endpoint.trim().to_string(),
            aad_authority: self.aad_authority.trim().to_string(),
            cors_origins: parse_cors_origins(&self.cors_origins),
            upstream_timeout_ms: self.upstream_timeout_ms,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum CliRefreshStrategy {
    /// Refresh the token on a fixed interval and keep the same transport.
    Proactive,
    /// Rebuild the transport after a disconnect status.
    Reactive,
}

#[derive(Debug, Args)]
pub(crate) struct ChatArgs {
    #[arg(
        long = "base-url",
        env = "CHATLINK_BASE_URL",
        default_value = "http://127.0.0.1:8000",
        help = "Base URL of a running chatlink gateway"
    )]
    pub(crate) base_url: String,

    #[arg(long, value_enum, default_value = "reactive")]
    pub(crate) strategy: CliRefreshStrategy,

    #[arg(
        long = "refresh-interval-minutes",
        default_value_t = DEFAULT_REFRESH_INTERVAL.as_secs() / 60,
        value_parser = parse_refresh_interval_minutes,
        help = "Token refresh period for --strategy proactive"
    )]
    pub(crate) refresh_interval_minutes: u64,

    #[arg(
        long = "poll-interval-ms",
        default_value_t = 1_000,
        value_parser = parse_positive_u64
    )]
    pub(crate) poll_interval_ms: u64,

    #[arg(
        long = "state-file",
        env = "CHATLINK_STATE_FILE",
        help = "Persist the watermark here so a restarted chat resumes its history position"
    )]
    pub(crate) state_file: Option<PathBuf>,

    #[arg(long = "user-id", default_value = "user")]
    pub(crate) user_id: String,

    #[arg(
        long = "credential-timeout-ms",
        env = "CHATLINK_CREDENTIAL_TIMEOUT_MS",
        default_value_t = 0,
        help = "Client timeout for gateway credential fetches; 0 waits without a timeout"
    )]
    pub(crate) credential_timeout_ms: u64,
}

impl ChatArgs {
    pub(crate) fn base_url(&self) -> String {
        self.base_url.trim().trim_end_matches('/').to_string()
    }

    pub(crate) fn refresh_strategy(&self) -> RefreshStrategy {
        match self.strategy {
            CliRefreshStrategy::Proactive => RefreshStrategy::Proactive {
                interval: Duration::from_secs(self.refresh_interval_minutes.saturating_mul(60)),
            },
            CliRefreshStrategy::Reactive => RefreshStrategy::Reactive,
        }
    }

    /// Proactive sessions fetch a bare token; reactive sessions start a
    /// conversation so every rebuild carries its own conversation id.
    pub(crate) fn token_endpoint(&self) -> TokenEndpoint {
        match self.strategy {
            CliRefreshStrategy::Proactive => TokenEndpoint::DirectLineToken,
            CliRefreshStrategy::Reactive => TokenEndpoint::Conversation,
        }
    }

    pub(crate) fn directline_domain(&self) -> String {
        format!("{}{}", self.base_url(), DIRECTLINE_DOMAIN)
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
