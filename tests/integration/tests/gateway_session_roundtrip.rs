use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use anyhow::Result;
use chatlink_core::{MemorySessionStorage, SessionState, SessionStorage, WATERMARK_STORAGE_KEY};
use chatlink_directline::{Activity, ChatTransport, DirectLineTransportFactory};
use chatlink_gateway::{build_gateway_app, GatewayConfig, DIRECTLINE_DOMAIN};
use chatlink_session::{
    HttpTokenProvider, RefreshStrategy, RenderTarget, Renderer, SessionPhase, TokenEndpoint,
    TransportLifecycleConfig, TransportLifecycleManager,
};
use httpmock::prelude::*;
use serde_json::json;
use tokio::net::TcpListener;

#[derive(Default)]
struct RecordingRenderer {
    calls: Mutex<Vec<(u64, Option<String>)>>,
}

impl RecordingRenderer {
    fn calls(&self) -> Vec<(u64, Option<String>)> {
        self.calls.lock().expect("lock").clone()
    }
}

impl Renderer for RecordingRenderer {
    fn render(
        &self,
        transport: Arc<dyn ChatTransport>,
        _target: &RenderTarget,
        watermark: Option<&str>,
    ) -> Result<()> {
        self.calls
            .lock()
            .expect("lock")
            .push((transport.transport_id(), watermark.map(str::to_string)));
        Ok(())
    }
}

fn gateway_config(upstream: &MockServer) -> GatewayConfig {
    GatewayConfig {
        bind: "127.0.0.1:0".to_string(),
        tenant_id: "tenant-1".to_string(),
        client_id: "client-1".to_string(),
        client_secret: "s3cret".to_string(),
        agent_id: "agent-7".to_string(),
        environment_id: "env-3".to_string(),
        resource_app_id: "res-app".to_string(),
        directline_endpoint: upstream.base_url(),
        token_endpoint: upstream.url("/issue"),
        aad_authority: upstream.base_url(),
        cors_origins: vec!["*".to_string()],
        upstream_timeout_ms: 2_000,
    }
}

fn mock_token_chain(upstream: &MockServer) {
    upstream.mock(|when, then| {
        when.method(POST).path("/tenant-1/oauth2/v2.0/token");
        then.status(200)
            .json_body(json!({"access_token": "aad-1", "expires_in": 3600}));
    });
    upstream.mock(|when, then| {
        when.method(GET).path("/issue");
        then.status(200)
            .json_body(json!({"token": "dl-1", "expires_in": 1800}));
    });
}

async fn spawn_gateway(upstream: &MockServer) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral listener");
    let addr = listener.local_addr().expect("resolve listener addr");
    let app = build_gateway_app(&gateway_config(upstream)).expect("gateway app");
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    (addr, handle)
}

async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn integration_reactive_session_rebuilds_after_upstream_outage_and_resumes_watermark() {
    let upstream = MockServer::start();
    mock_token_chain(&upstream);
    let start = upstream.mock(|when, then| {
        when.method(POST).path("/v3/directline/conversations");
        then.status(201).json_body(json!({
            "conversationId": "conv-1",
            "token": "dl-conv",
            "expires_in": 1800
        }));
    });
    let mut activities_ok = upstream.mock(|when, then| {
        when.method(GET)
            .path("/v3/directline/conversations/conv-1/activities");
        then.status(200).json_body(json!({
            "activities": [{
                "id": "conv-1|0000001",
                "type": "message",
                "from": {"id": "agent"},
                "text": "welcome"
            }],
            "watermark": "1"
        }));
    });
    let post = upstream.mock(|when, then| {
        when.method(POST)
            .path("/v3/directline/conversations/conv-1/activities");
        then.status(200).json_body(json!({"id": "conv-1|0000002"}));
    });
    let (addr, gateway) = spawn_gateway(&upstream).await;
    let base_url = format!("http://{addr}");

    let storage = Arc::new(MemorySessionStorage::new());
    let state = Arc::new(SessionState::new(storage.clone()));
    let renderer = Arc::new(RecordingRenderer::default());
    let provider = HttpTokenProvider::new(&base_url, TokenEndpoint::Conversation, 2_000)
        .expect("provider");
    let factory = DirectLineTransportFactory::new(format!("{base_url}{DIRECTLINE_DOMAIN}"))
        .with_poll_interval(Duration::from_millis(10));
    let mut handle = TransportLifecycleManager::new(
        Arc::new(provider),
        Arc::new(factory),
        renderer.clone(),
        state.clone(),
        TransportLifecycleConfig {
            strategy: RefreshStrategy::Reactive,
            target: RenderTarget::new("webchat"),
        },
    )
    .start()
    .await
    .expect("start session");

    assert!(
        wait_until(Duration::from_secs(5), || state.watermark().as_deref()
            == Some("conv-1|0000001"))
        .await
    );
    assert_eq!(
        storage.get(WATERMARK_STORAGE_KEY).as_deref(),
        Some("conv-1|0000001")
    );

    let first = handle.current_transport().expect("transport");
    assert_eq!(first.conversation_id().as_deref(), Some("conv-1"));
    let posted = first
        .post_activity(Activity::message("user", "hello"))
        .await
        .expect("post activity");
    assert_eq!(posted, "conv-1|0000002");
    post.assert();

    activities_ok.delete();
    upstream.mock(|when, then| {
        when.method(GET)
            .path("/v3/directline/conversations/conv-1/activities");
        then.status(503).body("agent unavailable");
    });

    assert!(wait_until(Duration::from_secs(5), || handle.rebuild_count() >= 1).await);
    handle.shutdown().await;
    gateway.abort();

    assert!(start.hits() >= 2);
    let calls = renderer.calls();
    assert_eq!(calls[0], (first.transport_id(), None));
    let rebuilt = calls.get(1).expect("second render");
    assert_ne!(rebuilt.0, first.transport_id());
    assert_eq!(rebuilt.1.as_deref(), Some("conv-1|0000001"));
    assert_eq!(handle.phase(), SessionPhase::Disconnected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn integration_proactive_session_refreshes_token_without_rebuilding() {
    let upstream = MockServer::start();
    mock_token_chain(&upstream);
    let start = upstream.mock(|when, then| {
        when.method(POST).path("/v3/directline/conversations");
        then.status(201)
            .json_body(json!({"conversationId": "conv-9", "token": "dl-conv"}));
    });
    upstream.mock(|when, then| {
        when.method(GET)
            .path("/v3/directline/conversations/conv-9/activities");
        then.status(200)
            .json_body(json!({"activities": [], "watermark": "0"}));
    });
    let (addr, gateway) = spawn_gateway(&upstream).await;
    let base_url = format!("http://{addr}");

    let state = Arc::new(SessionState::new(Arc::new(MemorySessionStorage::new())));
    let renderer = Arc::new(RecordingRenderer::default());
    let provider = HttpTokenProvider::new(&base_url, TokenEndpoint::DirectLineToken, 2_000)
        .expect("provider");
    let factory = DirectLineTransportFactory::new(format!("{base_url}{DIRECTLINE_DOMAIN}"))
        .with_poll_interval(Duration::from_millis(10));
    let mut handle = TransportLifecycleManager::new(
        Arc::new(provider),
        Arc::new(factory),
        renderer.clone(),
        state,
        TransportLifecycleConfig {
            strategy: RefreshStrategy::Proactive {
                interval: Duration::from_millis(60),
            },
            target: RenderTarget::default(),
        },
    )
    .start()
    .await
    .expect("start session");
    let first_id = handle.current_transport().expect("transport").transport_id();

    assert!(wait_until(Duration::from_secs(5), || handle.refresh_count() >= 2).await);
    let current = handle.current_transport().expect("transport");
    assert_eq!(current.transport_id(), first_id);
    assert_eq!(current.conversation_id().as_deref(), Some("conv-9"));
    assert_eq!(current.token(), "dl-1");
    assert_eq!(renderer.calls().len(), 1);
    assert_eq!(start.hits(), 1);

    handle.shutdown().await;
    gateway.abort();
}
