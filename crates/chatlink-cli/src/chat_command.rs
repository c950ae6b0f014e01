use std::sync::Arc;

use anyhow::{Context, Result};
use chatlink_core::{FileSessionStorage, MemorySessionStorage, SessionState, SessionStorage};
use chatlink_directline::{Activity, DirectLineTransportFactory};
use chatlink_session::{
    HttpTokenProvider, LifecycleHandle, RenderTarget, TransportLifecycleConfig,
    TransportLifecycleManager,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli_args::ChatArgs;
use crate::terminal_renderer::TerminalRenderer;

const TERMINAL_RENDER_TARGET: &str = "terminal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChatInput {
    Skip,
    Quit,
    Status,
    Send(String),
}

pub(crate) fn parse_chat_input(line: &str) -> ChatInput {
    let trimmed = line.trim();
    match trimmed {
        "" => ChatInput::Skip,
        "/quit" | "/exit" => ChatInput::Quit,
        "/status" => ChatInput::Status,
        _ => ChatInput::Send(trimmed.to_string()),
    }
}

pub(crate) fn open_session_storage(args: &ChatArgs) -> Result<Arc<dyn SessionStorage>> {
    match &args.state_file {
        Some(path) => {
            let storage = FileSessionStorage::load(path.clone())
                .with_context(|| format!("failed to open chat state file {}", path.display()))?;
            Ok(Arc::new(storage))
        }
        None => Ok(Arc::new(MemorySessionStorage::new())),
    }
}

pub(crate) async fn run_chat_command(args: &ChatArgs) -> Result<()> {
    let state = Arc::new(SessionState::new(open_session_storage(args)?));
    let provider = HttpTokenProvider::new(
        &args.base_url(),
        args.token_endpoint(),
        args.credential_timeout_ms,
    )
    .context("failed to create token provider client")?;
    let factory =
        DirectLineTransportFactory::new(args.directline_domain()).with_poll_interval(args.poll_interval());
    let renderer = Arc::new(TerminalRenderer::stdout(args.user_id.trim()));

    let manager = TransportLifecycleManager::new(
        Arc::new(provider),
        Arc::new(factory),
        renderer.clone(),
        state,
        TransportLifecycleConfig {
            strategy: args.refresh_strategy(),
            target: RenderTarget::new(TERMINAL_RENDER_TARGET),
        },
    );
    let mut handle = manager.start().await?;
    println!(
        "chatlink chat connected: base_url={} strategy={:?} (type a message, /status, /quit)",
        args.base_url(),
        args.strategy
    );

    let result = run_input_loop(&handle, args.user_id.trim()).await;
    handle.shutdown().await;
    renderer.clear();
    result
}

async fn run_input_loop(handle: &LifecycleHandle, user_id: &str) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read chat input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            return Ok(());
        };
        match parse_chat_input(&line) {
            ChatInput::Skip => {}
            ChatInput::Quit => return Ok(()),
            ChatInput::Status => println!("{}", render_status(handle)),
            ChatInput::Send(text) => {
                if let Err(error) = send_message(handle, user_id, text).await {
                    eprintln!("send failed: {error:#}");
                }
            }
        }
    }
}

async fn send_message(handle: &LifecycleHandle, user_id: &str, text: String) -> Result<String> {
    let transport = handle
        .current_transport()
        .context("no active chat transport")?;
    let id = transport
        .post_activity(Activity::message(user_id, text))
        .await
        .context("failed to post message activity")?;
    tracing::debug!(activity_id = %id, "posted message activity");
    Ok(id)
}

pub(crate) fn render_status(handle: &LifecycleHandle) -> String {
    let transport = handle.current_transport();
    let state = handle.state();
    format!(
        "phase={} transport_status={} conversation_id={} watermark={} refreshes={} rebuilds={}",
        handle.phase().as_str(),
        transport
            .as_ref()
            .map(|transport| transport.status().as_str())
            .unwrap_or("none"),
        transport
            .as_ref()
            .and_then(|transport| transport.conversation_id())
            .unwrap_or_else(|| "none".to_string()),
        state.watermark().unwrap_or_else(|| "none".to_string()),
        handle.refresh_count(),
        handle.rebuild_count(),
    )
}
