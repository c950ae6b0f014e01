//! Token broker for chatlink clients.
//!
//! Authenticates against Azure AD with client credentials, exchanges the AAD
//! token for a Direct Line token, and exposes token issue, conversation start
//! and the activity proxy over HTTP alongside a hosted webchat page.
pub mod aad_auth;
pub mod agent_client;
pub mod gateway_config;
pub mod gateway_server;

pub use aad_auth::{AadTokenProvider, TOKEN_EXPIRY_MARGIN_SECONDS};
pub use agent_client::{is_valid_conversation_id, AgentClient};
pub use gateway_config::{
    parse_cors_origins, resolve_client_secret, GatewayConfig, DEFAULT_AAD_AUTHORITY,
    DEFAULT_DIRECTLINE_ENDPOINT, DEFAULT_GATEWAY_BIND, DEFAULT_UPSTREAM_TIMEOUT_MS,
};
pub use gateway_server::{
    build_cors_layer, build_gateway_app, run_gateway_server, CHAT_TOKEN_ENDPOINT, CONVERSATIONS_ENDPOINT,
    CONVERSATION_ACTIVITIES_ENDPOINT, DIRECTLINE_DOMAIN, DIRECTLINE_TOKEN_ENDPOINT,
};
