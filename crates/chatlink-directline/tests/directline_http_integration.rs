use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chatlink_core::{ChatlinkError, Credential};
use chatlink_directline::{
    Activity, ChatTransport, ConnectionStatus, DirectLineClient, DirectLineTransport,
    DirectLineTransportFactory, TransportFactory, TransportOptions,
};
use httpmock::prelude::*;
use serde_json::json;

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

fn fast_options(credential: &Credential, domain: String) -> TransportOptions {
    let mut options = TransportOptions::new(credential, domain);
    options.poll_interval = Duration::from_millis(10);
    options.max_consecutive_failures = 2;
    options.request_timeout_ms = 2_000;
    options
}

fn record_statuses(transport: &dyn ChatTransport) -> Arc<Mutex<Vec<ConnectionStatus>>> {
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    let _subscription = transport
        .connection_status()
        .subscribe(move |status| sink.lock().expect("lock").push(*status));
    statuses
}

#[tokio::test]
async fn functional_client_starts_conversation_with_bearer_token() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/directline/conversations")
            .header("authorization", "Bearer T1");
        then.status(201).json_body(json!({
            "conversationId": "conv-1",
            "token": "T-conv",
            "expires_in": 1800,
            "streamUrl": "wss://example/stream"
        }));
    });

    let client = DirectLineClient::new(&server.url("/directline/"), 2_000).expect("client");
    let started = client.start_conversation("T1").await.expect("start");

    mock.assert();
    assert_eq!(started.conversation_id, "conv-1");
    assert_eq!(started.token.as_deref(), Some("T-conv"));
}

#[tokio::test]
async fn functional_client_forwards_watermark_query() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/directline/conversations/conv-1/activities")
            .query_param("watermark", "4")
            .header("authorization", "Bearer T1");
        then.status(200).json_body(json!({
            "activities": [{"id": "conv-1|0000005", "type": "message", "text": "five"}],
            "watermark": "5"
        }));
    });

    let client = DirectLineClient::new(&server.url("/directline"), 2_000).expect("client");
    let set = client
        .get_activities("T1", "conv-1", Some("4"))
        .await
        .expect("activities");

    mock.assert();
    assert_eq!(set.watermark.as_deref(), Some("5"));
    assert_eq!(set.activities[0].activity_id(), Some("conv-1|0000005"));
}

#[tokio::test]
async fn regression_client_reports_status_and_truncated_body_on_failure() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/directline/conversations/conv-1/activities");
        then.status(502).body("x".repeat(2_000));
    });

    let client = DirectLineClient::new(&server.url("/directline"), 2_000).expect("client");
    let error = client
        .post_activity("T1", "conv-1", &Activity::message("user", "hi"))
        .await
        .expect_err("502 should fail");

    match error {
        ChatlinkError::HttpStatus { status, body } => {
            assert_eq!(status, 502);
            assert!(body.len() < 900);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn integration_transport_starts_conversation_and_emits_activities() {
    let server = MockServer::start();
    let start = server.mock(|when, then| {
        when.method(POST)
            .path("/directline/conversations")
            .header("authorization", "Bearer T1");
        then.status(201)
            .json_body(json!({"conversationId": "conv-7", "token": "T-conv"}));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/directline/conversations/conv-7/activities")
            .header("authorization", "Bearer T-conv");
        then.status(200).json_body(json!({
            "activities": [
                {"id": "conv-7|0000001", "type": "message", "from": {"id": "bot"}, "text": "hello"}
            ],
            "watermark": "1"
        }));
    });

    let transport = DirectLineTransport::start(fast_options(
        &Credential::new("T1"),
        server.url("/directline"),
    ))
    .expect("transport");
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let subscription = transport.activities().subscribe(move |activity: &Activity| {
        sink.lock()
            .expect("lock")
            .push(activity.id.clone().unwrap_or_default());
    });

    assert!(
        wait_until(Duration::from_secs(3), || !received
            .lock()
            .expect("lock")
            .is_empty())
        .await
    );
    start.assert();
    assert_eq!(transport.status(), ConnectionStatus::Online);
    assert_eq!(transport.conversation_id().as_deref(), Some("conv-7"));
    assert_eq!(transport.token(), "T-conv");
    assert_eq!(received.lock().expect("lock")[0], "conv-7|0000001");

    subscription.unsubscribe();
    transport.end();
    assert_eq!(transport.status(), ConnectionStatus::Ended);
}

#[tokio::test]
async fn functional_transport_reports_expired_token_and_recovers_after_reconnect() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/dl/conversations/conv-1/activities")
            .header("authorization", "Bearer OLD");
        then.status(403).body("token expired");
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/dl/conversations/conv-1/activities")
            .header("authorization", "Bearer NEW");
        then.status(200).json_body(json!({"activities": [], "watermark": "0"}));
    });

    let transport = DirectLineTransport::start(fast_options(
        &Credential::with_conversation("OLD", "conv-1"),
        server.url("/dl"),
    ))
    .expect("transport");

    assert!(
        wait_until(Duration::from_secs(3), || transport.status()
            == ConnectionStatus::ExpiredToken)
        .await
    );
    transport.reconnect(Credential::new("NEW"));
    assert!(
        wait_until(Duration::from_secs(3), || transport.status() == ConnectionStatus::Online)
            .await
    );
    assert_eq!(transport.token(), "NEW");
    assert_eq!(transport.conversation_id().as_deref(), Some("conv-1"));
    transport.end();
}

#[tokio::test]
async fn functional_transport_fails_to_connect_after_repeated_server_errors() {
    let server = MockServer::start();
    let poll = server.mock(|when, then| {
        when.method(GET).path("/dl/conversations/conv-1/activities");
        then.status(503).body("unavailable");
    });

    let transport = DirectLineTransport::start(fast_options(
        &Credential::with_conversation("T1", "conv-1"),
        server.url("/dl"),
    ))
    .expect("transport");
    let statuses = record_statuses(transport.as_ref());

    assert!(
        wait_until(Duration::from_secs(3), || transport.status()
            == ConnectionStatus::FailedToConnect)
        .await
    );
    assert_eq!(poll.hits(), 2);
    assert_eq!(
        statuses.lock().expect("lock").last(),
        Some(&ConnectionStatus::FailedToConnect)
    );

    transport.end();
    assert_eq!(transport.status(), ConnectionStatus::FailedToConnect);
}

#[tokio::test]
async fn functional_transport_ends_when_conversation_is_gone() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/dl/conversations/conv-gone/activities");
        then.status(404).body("not found");
    });

    let transport = DirectLineTransport::start(fast_options(
        &Credential::with_conversation("T1", "conv-gone"),
        server.url("/dl"),
    ))
    .expect("transport");

    assert!(
        wait_until(Duration::from_secs(3), || transport.status() == ConnectionStatus::Ended)
            .await
    );
}

#[tokio::test]
async fn functional_post_activity_returns_id() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/dl/conversations/conv-1/activities");
        then.status(200).json_body(json!({"activities": []}));
    });
    let post = server.mock(|when, then| {
        when.method(POST)
            .path("/dl/conversations/conv-1/activities")
            .header("authorization", "Bearer T1")
            .json_body_includes(json!({"type": "message", "text": "ping"}).to_string());
        then.status(200).json_body(json!({"id": "conv-1|0000002"}));
    });

    let transport = DirectLineTransport::start(fast_options(
        &Credential::with_conversation("T1", "conv-1"),
        server.url("/dl"),
    ))
    .expect("transport");
    let id = transport
        .post_activity(Activity::message("user", "ping"))
        .await
        .expect("post");

    post.assert();
    assert_eq!(id, "conv-1|0000002");
    transport.end();

    let error = transport
        .post_activity(Activity::message("user", "late"))
        .await
        .expect_err("ended transport rejects posts");
    assert!(matches!(error, ChatlinkError::TransportEnded));
}

#[tokio::test]
async fn unit_factory_rejects_blank_token() {
    let factory = DirectLineTransportFactory::new("http://127.0.0.1:9/dl");
    let error = match factory.build(&Credential::new("  ")) {
        Ok(_) => panic!("blank token should be rejected"),
        Err(error) => error,
    };
    assert!(matches!(error, ChatlinkError::InvalidCredential(_)));
}
