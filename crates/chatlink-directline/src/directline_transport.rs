//! Polling Direct Line transport.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chatlink_core::{ChatlinkError, Credential, EventStream};
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    transport::{
        DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT_MS,
    },
    Activity, ChatTransport, ConnectionStatus, DirectLineClient, TransportFactory,
    TransportOptions,
};

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
enum PollOutcome {
    Delivered(usize),
    Unauthorized,
    ConversationGone,
    Failed(ChatlinkError),
}

#[derive(Debug)]
struct ConnectionCredential {
    token: String,
    conversation_id: Option<String>,
}

struct TransportInner {
    id: u64,
    client: DirectLineClient,
    poll_interval: Duration,
    max_consecutive_failures: usize,
    credential: Mutex<ConnectionCredential>,
    watermark: Mutex<Option<String>>,
    status: Mutex<ConnectionStatus>,
    status_stream: EventStream<ConnectionStatus>,
    activity_stream: EventStream<Activity>,
}

impl TransportInner {
    fn current_status(&self) -> ConnectionStatus {
        self.status
            .lock()
            .map(|status| *status)
            .unwrap_or(ConnectionStatus::Ended)
    }

    /// Applies `next` and notifies listeners when the status actually changed.
    /// Terminal statuses are sticky.
    fn set_status(&self, next: ConnectionStatus) -> bool {
        {
            let Ok(mut status) = self.status.lock() else {
                return false;
            };
            if *status == next || status.is_disconnect() {
                return false;
            }
            *status = next;
        }
        tracing::debug!(transport_id = self.id, status = %next, "direct line status changed");
        self.status_stream.emit(&next);
        true
    }

    fn token_and_conversation(&self) -> (String, Option<String>) {
        match self.credential.lock() {
            Ok(credential) => (
                credential.token.clone(),
                credential.conversation_id.clone(),
            ),
            Err(_) => (String::new(), None),
        }
    }

    async fn ensure_conversation(&self) -> Result<(String, String), ChatlinkError> {
        let (token, conversation_id) = self.token_and_conversation();
        if let Some(conversation_id) = conversation_id {
            return Ok((token, conversation_id));
        }

        let started = self.client.start_conversation(&token).await?;
        let token = started
            .token
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(token);
        if let Ok(mut credential) = self.credential.lock() {
            credential.token = token.clone();
            credential.conversation_id = Some(started.conversation_id.clone());
        }
        tracing::info!(
            transport_id = self.id,
            conversation_id = %started.conversation_id,
            "direct line conversation started"
        );
        Ok((token, started.conversation_id))
    }

    async fn poll_once(&self) -> PollOutcome {
        let (token, conversation_id) = match self.ensure_conversation().await {
            Ok(value) => value,
            Err(error) => return classify_failure(error),
        };
        let watermark = self.watermark.lock().ok().and_then(|value| value.clone());
        let set = match self
            .client
            .get_activities(&token, &conversation_id, watermark.as_deref())
            .await
        {
            Ok(set) => set,
            Err(error) => return classify_failure(error),
        };

        let delivered = set.activities.len();
        if let Some(next) = set.watermark.filter(|value| !value.is_empty()) {
            if let Ok(mut watermark) = self.watermark.lock() {
                *watermark = Some(next);
            }
        }
        for activity in &set.activities {
            self.activity_stream.emit(activity);
        }
        PollOutcome::Delivered(delivered)
    }
}

fn classify_failure(error: ChatlinkError) -> PollOutcome {
    match error.status_code() {
        Some(401) | Some(403) => PollOutcome::Unauthorized,
        Some(404) => PollOutcome::ConversationGone,
        _ => PollOutcome::Failed(error),
    }
}

async fn run_poll_loop(inner: Arc<TransportInner>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut consecutive_failures = 0_usize;
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        let outcome = tokio::select! {
            outcome = inner.poll_once() => outcome,
            _ = shutdown_rx.changed() => break,
        };
        match outcome {
            PollOutcome::Delivered(count) => {
                consecutive_failures = 0;
                inner.set_status(ConnectionStatus::Online);
                if count > 0 {
                    tracing::debug!(transport_id = inner.id, count, "direct line activities received");
                }
            }
            PollOutcome::Unauthorized => {
                consecutive_failures = 0;
                inner.set_status(ConnectionStatus::ExpiredToken);
            }
            PollOutcome::ConversationGone => {
                inner.set_status(ConnectionStatus::Ended);
                break;
            }
            PollOutcome::Failed(error) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                tracing::warn!(
                    transport_id = inner.id,
                    consecutive_failures,
                    error = %error,
                    "direct line poll failed"
                );
                if consecutive_failures >= inner.max_consecutive_failures {
                    inner.set_status(ConnectionStatus::FailedToConnect);
                    break;
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(inner.poll_interval) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

/// Direct Line transport that long-polls the activities endpoint.
///
/// A polling task is spawned on construction and runs until [`ChatTransport::end`]
/// is called or the transport reaches a terminal status.
pub struct DirectLineTransport {
    inner: Arc<TransportInner>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DirectLineTransport {
    pub fn start(options: TransportOptions) -> Result<Arc<Self>, ChatlinkError> {
        let token = options.token.trim().to_string();
        if token.is_empty() {
            return Err(ChatlinkError::InvalidCredential(
                "transport requires a non-empty token".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ChatlinkError::TransportUnavailable(
                "direct line transport requires an active Tokio runtime".to_string(),
            )
        })?;
        let client = DirectLineClient::new(&options.domain, options.request_timeout_ms)?;
        let inner = Arc::new(TransportInner {
            id: NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed),
            client,
            poll_interval: if options.poll_interval.is_zero() {
                DEFAULT_POLL_INTERVAL
            } else {
                options.poll_interval
            },
            max_consecutive_failures: options.max_consecutive_failures.max(1),
            credential: Mutex::new(ConnectionCredential {
                token,
                conversation_id: options
                    .conversation_id
                    .filter(|value| !value.trim().is_empty()),
            }),
            watermark: Mutex::new(None),
            status: Mutex::new(ConnectionStatus::Uninitialized),
            status_stream: EventStream::new(),
            activity_stream: EventStream::new(),
        });
        inner.set_status(ConnectionStatus::Connecting);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = runtime.spawn(run_poll_loop(Arc::clone(&inner), shutdown_rx));
        Ok(Arc::new(Self {
            inner,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }))
    }
}

#[async_trait]
impl ChatTransport for DirectLineTransport {
    fn transport_id(&self) -> u64 {
        self.inner.id
    }

    fn status(&self) -> ConnectionStatus {
        self.inner.current_status()
    }

    fn connection_status(&self) -> &EventStream<ConnectionStatus> {
        &self.inner.status_stream
    }

    fn activities(&self) -> &EventStream<Activity> {
        &self.inner.activity_stream
    }

    fn token(&self) -> String {
        self.inner.token_and_conversation().0
    }

    fn conversation_id(&self) -> Option<String> {
        self.inner.token_and_conversation().1
    }

    fn reconnect(&self, credential: Credential) {
        if self.inner.current_status().is_disconnect() {
            tracing::debug!(
                transport_id = self.inner.id,
                "ignoring reconnect on a terminated direct line transport"
            );
            return;
        }
        if let Ok(mut current) = self.inner.credential.lock() {
            current.token = credential.token;
            if credential.conversation_id.is_some() {
                current.conversation_id = credential.conversation_id;
            }
        }
        self.inner.set_status(ConnectionStatus::Connecting);
    }

    async fn post_activity(&self, activity: Activity) -> Result<String, ChatlinkError> {
        if self.inner.current_status().is_disconnect() {
            return Err(ChatlinkError::TransportEnded);
        }
        let (token, conversation_id) = self.inner.ensure_conversation().await?;
        self.inner
            .client
            .post_activity(&token, &conversation_id, &activity)
            .await
    }

    fn end(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Ok(mut task) = self.task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
        self.inner.set_status(ConnectionStatus::Ended);
    }
}

impl Drop for DirectLineTransport {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[derive(Debug, Clone)]
/// Factory producing [`DirectLineTransport`] instances rooted at one domain.
pub struct DirectLineTransportFactory {
    pub domain: String,
    pub poll_interval: Duration,
    pub max_consecutive_failures: usize,
    pub request_timeout_ms: u64,
}

impl DirectLineTransportFactory {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl TransportFactory for DirectLineTransportFactory {
    fn build(&self, credential: &Credential) -> Result<Arc<dyn ChatTransport>, ChatlinkError> {
        let mut options = TransportOptions::new(credential, self.domain.clone());
        options.poll_interval = self.poll_interval;
        options.max_consecutive_failures = self.max_consecutive_failures;
        options.request_timeout_ms = self.request_timeout_ms;
        let transport: Arc<dyn ChatTransport> = DirectLineTransport::start(options)?;
        Ok(transport)
    }
}
