//! Transport lifecycle: first connect, credential refresh, reactive rebuild.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chatlink_core::{Credential, SessionState, Subscription};
use chatlink_directline::{ChatTransport, ConnectionStatus, TransportFactory};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{track_watermark, RenderTarget, Renderer, TokenProvider};


pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(25 * 60);
/// Longest accepted proactive refresh period; Direct Line tokens live far shorter.
pub const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Decides when the lifecycle manager refreshes the session.
pub enum RefreshStrategy {
    /// Fetch a new token every `interval` and refresh the live transport in place.
    Proactive { interval: Duration },
    /// Rebuild the transport whenever it reports a disconnect status.
    #[default]
    Reactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connected,
    Disconnected,
    Rebuilding,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Rebuilding => "rebuilding",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportLifecycleConfig {
    pub strategy: RefreshStrategy,
    pub target: RenderTarget,
}

type StatusSender = mpsc::UnboundedSender<(u64, ConnectionStatus)>;

struct ActiveTransport {
    generation: u64,
    transport: Arc<dyn ChatTransport>,
    subscriptions: Vec<Subscription>,
}

impl ActiveTransport {
    fn detach(self) -> Arc<dyn ChatTransport> {
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
        self.transport
    }
}

struct LifecycleShared {
    provider: Arc<dyn TokenProvider>,
    factory: Arc<dyn TransportFactory>,
    renderer: Arc<dyn Renderer>,
    state: Arc<SessionState>,
    config: TransportLifecycleConfig,
    active: Mutex<Option<ActiveTransport>>,
    phase: Mutex<SessionPhase>,
    next_generation: AtomicU64,
    refresh_count: AtomicU64,
    rebuild_count: AtomicU64,
}

impl LifecycleShared {
    async fn obtain_credential(&self) -> Result<Credential> {
        let credential = self
            .provider
            .obtain_credential()
            .await
            .context("failed to obtain chat credential")?;
        self.state.replace_credential(credential.clone());
        Ok(credential)
    }

    fn build_transport(&self, credential: &Credential) -> Result<Arc<dyn ChatTransport>> {
        self.factory
            .build(credential)
            .context("failed to build chat transport")
    }

    fn set_phase(&self, next: SessionPhase) {
        if let Ok(mut phase) = self.phase.lock() {
            *phase = next;
        }
    }

    fn phase(&self) -> SessionPhase {
        self.phase
            .lock()
            .map(|phase| *phase)
            .unwrap_or(SessionPhase::Disconnected)
    }

    fn current_transport(&self) -> Option<Arc<dyn ChatTransport>> {
        self.active
            .lock()
            .ok()
            .and_then(|active| active.as_ref().map(|active| Arc::clone(&active.transport)))
    }

    fn current_generation(&self) -> Option<u64> {
        self.active
            .lock()
            .ok()
            .and_then(|active| active.as_ref().map(|active| active.generation))
    }

    /// Subscribes the watermark tracker (and the status forwarder when given)
    /// to `transport` and makes it the current transport. Returns the one it
    /// replaced.
    fn install(
        &self,
        transport: Arc<dyn ChatTransport>,
        status_tx: Option<&StatusSender>,
    ) -> Option<ActiveTransport> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut subscriptions = vec![track_watermark(&self.state, transport.as_ref())];
        if let Some(status_tx) = status_tx {
            let forward = status_tx.clone();
            subscriptions.push(transport.connection_status().subscribe(move |status| {
                let _ = forward.send((generation, *status));
            }));
            let status = transport.status();
            if status.is_disconnect() {
                let _ = status_tx.send((generation, status));
            }
        }
        let active = ActiveTransport {
            generation,
            transport,
            subscriptions,
        };
        match self.active.lock() {
            Ok(mut current) => current.replace(active),
            Err(_) => None,
        }
    }

    fn render(&self, transport: Arc<dyn ChatTransport>, watermark: Option<String>) -> Result<()> {
        self.renderer
            .render(transport, &self.config.target, watermark.as_deref())
            .with_context(|| format!("failed to render chat into '{}'", self.config.target))
    }

    async fn refresh_in_place(&self) -> Result<()> {
        let credential = self.obtain_credential().await?;
        let transport = self
            .current_transport()
            .ok_or_else(|| anyhow!("no active chat transport to refresh"))?;
        transport.reconnect(credential);
        let count = self.refresh_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            transport_id = transport.transport_id(),
            refresh_count = count,
            "refreshed chat transport credential"
        );
        Ok(())
    }

    async fn handle_status(
        &self,
        generation: u64,
        status: ConnectionStatus,
        status_tx: &StatusSender,
    ) -> Result<()> {
        if self.current_generation() != Some(generation) {
            tracing::debug!(generation, status = %status, "ignoring status from superseded transport");
            return Ok(());
        }
        if !status.is_disconnect() {
            return Ok(());
        }

        tracing::info!(generation, status = %status, "chat transport disconnected; rebuilding");
        self.set_phase(SessionPhase::Disconnected);
        self.set_phase(SessionPhase::Rebuilding);
        let rebuilt = self.rebuild(status_tx).await;
        if rebuilt.is_err() {
            self.set_phase(SessionPhase::Disconnected);
        }
        rebuilt
    }

    async fn rebuild(&self, status_tx: &StatusSender) -> Result<()> {
        let credential = self.obtain_credential().await?;
        let transport = self.build_transport(&credential)?;
        if let Some(previous) = self.install(Arc::clone(&transport), Some(status_tx)) {
            previous.detach().end();
        }
        self.render(transport, self.state.watermark())?;
        self.set_phase(SessionPhase::Connected);
        let count = self.rebuild_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(rebuild_count = count, "chat transport rebuilt");
        Ok(())
    }

    fn teardown(&self) {
        let previous = match self.active.lock() {
            Ok(mut active) => active.take(),
            Err(_) => None,
        };
        if let Some(previous) = previous {
            previous.detach().end();
        }
    }
}

/// Owns the current chat transport and keeps it authorized.
pub struct TransportLifecycleManager {
    shared: Arc<LifecycleShared>,
}

impl TransportLifecycleManager {
    pub fn new(
        provider: Arc<dyn TokenProvider>,
        factory: Arc<dyn TransportFactory>,
        renderer: Arc<dyn Renderer>,
        state: Arc<SessionState>,
        config: TransportLifecycleConfig,
    ) -> Self {
        Self {
            shared: Arc::new(LifecycleShared {
                provider,
                factory,
                renderer,
                state,
                config,
                active: Mutex::new(None),
                phase: Mutex::new(SessionPhase::Disconnected),
                next_generation: AtomicU64::new(1),
                refresh_count: AtomicU64::new(0),
                rebuild_count: AtomicU64::new(0),
            }),
        }
    }

    /// Fetches a credential and records it as the session's current one.
    pub async fn obtain_credential(&self) -> Result<Credential> {
        self.shared.obtain_credential().await
    }

    pub fn build_transport(&self, credential: &Credential) -> Result<Arc<dyn ChatTransport>> {
        self.shared.build_transport(credential)
    }

    /// Connects, renders and starts the refresh trigger.
    ///
    /// Errors from the first credential fetch, construction or render are
    /// returned to the caller; later refresh failures are logged.
    pub async fn start(self) -> Result<LifecycleHandle> {
        let shared = self.shared;
        let runtime = tokio::runtime::Handle::try_current()
            .context("chat lifecycle manager requires an active Tokio runtime")?;
        if let RefreshStrategy::Proactive { interval } = shared.config.strategy {
            if interval.is_zero() {
                anyhow::bail!("chat refresh interval must be greater than zero");
            }
            if interval > MAX_REFRESH_INTERVAL {
                anyhow::bail!(
                    "chat refresh interval {}s exceeds the {}s maximum",
                    interval.as_secs(),
                    MAX_REFRESH_INTERVAL.as_secs()
                );
            }
        }

        let credential = shared.obtain_credential().await?;
        let transport = shared.build_transport(&credential)?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = match shared.config.strategy {
            RefreshStrategy::Proactive { interval } => {
                shared.install(Arc::clone(&transport), None);
                if let Err(error) = shared.render(transport, None) {
                    shared.teardown();
                    return Err(error);
                }
                shared.set_phase(SessionPhase::Connected);
                runtime.spawn(run_proactive_refresh(
                    Arc::clone(&shared),
                    interval,
                    shutdown_rx,
                ))
            }
            RefreshStrategy::Reactive => {
                let (status_tx, status_rx) = mpsc::unbounded_channel();
                shared.install(Arc::clone(&transport), Some(&status_tx));
                if let Err(error) = shared.render(transport, shared.state.watermark()) {
                    shared.teardown();
                    return Err(error);
                }
                shared.set_phase(SessionPhase::Connected);
                runtime.spawn(run_reactive_reconnect(
                    Arc::clone(&shared),
                    status_tx,
                    status_rx,
                    shutdown_rx,
                ))
            }
        };

        tracing::info!(
            target_id = %shared.config.target,
            strategy = ?shared.config.strategy,
            "chat session started"
        );
        Ok(LifecycleHandle {
            shared,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

async fn run_proactive_refresh(
    shared: Arc<LifecycleShared>,
    period: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let now = tokio::time::Instant::now();
    let first_tick = now.checked_add(period).unwrap_or(now);
    let mut interval = tokio::time::interval_at(first_tick, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(error) = shared.refresh_in_place().await {
                    tracing::warn!(error = %format!("{error:#}"), "chat credential refresh failed");
                }
            }
            _ = &mut shutdown_rx => break,
        }
    }
}

async fn run_reactive_reconnect(
    shared: Arc<LifecycleShared>,
    status_tx: StatusSender,
    mut status_rx: mpsc::UnboundedReceiver<(u64, ConnectionStatus)>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            Some((generation, status)) = status_rx.recv() => {
                if let Err(error) = shared.handle_status(generation, status, &status_tx).await {
                    tracing::warn!(error = %format!("{error:#}"), "chat transport rebuild failed");
                }
            }
            _ = &mut shutdown_rx => break,
        }
    }
}

/// Running chat session returned by [`TransportLifecycleManager::start`].
pub struct LifecycleHandle {
    shared: Arc<LifecycleShared>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LifecycleHandle {
    pub fn current_transport(&self) -> Option<Arc<dyn ChatTransport>> {
        self.shared.current_transport()
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.phase()
    }

    pub fn state(&self) -> Arc<SessionState> {
        Arc::clone(&self.shared.state)
    }

    pub fn refresh_count(&self) -> u64 {
        self.shared.refresh_count.load(Ordering::Relaxed)
    }

    pub fn rebuild_count(&self) -> u64 {
        self.shared.rebuild_count.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the refresh trigger, unsubscribes every listener and ends the
    /// current transport.
    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.shared.teardown();
        self.shared.set_phase(SessionPhase::Disconnected);
    }
}
