//! Transport contract shared by the lifecycle manager and renderers.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chatlink_core::{ChatlinkError, Credential, EventStream};

use crate::{Activity, ConnectionStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: usize = 3;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Constructor arguments for a transport instance.
pub struct TransportOptions {
    pub token: String,
    pub domain: String,
    pub conversation_id: Option<String>,
    pub poll_interval: Duration,
    pub max_consecutive_failures: usize,
    pub request_timeout_ms: u64,
}

impl TransportOptions {
    pub fn new(credential: &Credential, domain: impl Into<String>) -> Self {
        Self {
            token: credential.token.clone(),
            domain: domain.into(),
            conversation_id: credential.conversation_id.clone(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

#[async_trait]
/// Live chat connection between the client and the bot backend.
pub trait ChatTransport: Send + Sync {
    /// Process-unique id, used to tell superseded instances apart in logs.
    fn transport_id(&self) -> u64;

    fn status(&self) -> ConnectionStatus;

    fn connection_status(&self) -> &EventStream<ConnectionStatus>;

    fn activities(&self) -> &EventStream<Activity>;

    /// Token the transport currently authenticates with.
    fn token(&self) -> String;

    fn conversation_id(&self) -> Option<String>;

    /// Refreshes the credential of this instance in place.
    fn reconnect(&self, credential: Credential);

    async fn post_activity(&self, activity: Activity) -> Result<String, ChatlinkError>;

    /// Stops the transport; it emits `Ended` unless already terminal.
    fn end(&self);
}

/// Builds a fresh transport for a credential.
pub trait TransportFactory: Send + Sync {
    fn build(&self, credential: &Credential) -> Result<Arc<dyn ChatTransport>, ChatlinkError>;
}
