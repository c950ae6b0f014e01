//! Prints a transport's conversation to a terminal.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use chatlink_core::Subscription;
use chatlink_directline::{Activity, ChatTransport, ConnectionStatus};
use chatlink_session::{RenderTarget, Renderer};

pub(crate) type SharedWriter = Arc<Mutex<dyn Write + Send>>;

const MAX_SHOWN_IDS_PER_TARGET: usize = 1_024;

/// Renders incoming message activities as `[HH:MM:SS] sender: text` lines.
///
/// Each target shows one transport at a time; rendering into a target again
/// detaches the previous transport's listeners. Activity ids already printed
/// for a target are remembered so a rebuilt transport replaying history does
/// not print them twice.
pub(crate) struct TerminalRenderer {
    output: SharedWriter,
    user_id: String,
    targets: Mutex<BTreeMap<String, RenderedTarget>>,
}

#[derive(Default)]
struct RenderedTarget {
    shown: Arc<Mutex<ShownIds>>,
    subscriptions: Vec<Subscription>,
}

/// Recently printed activity ids, oldest evicted first.
#[derive(Debug)]
pub(crate) struct ShownIds {
    capacity: usize,
    order: VecDeque<String>,
    ids: BTreeSet<String>,
}

impl Default for ShownIds {
    fn default() -> Self {
        Self::with_capacity(MAX_SHOWN_IDS_PER_TARGET)
    }
}

impl ShownIds {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            ids: BTreeSet::new(),
        }
    }

    /// Returns `true` when `id` was not already remembered.
    pub(crate) fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }

    #[cfg(test)]
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }
}

impl TerminalRenderer {
    pub(crate) fn new(output: SharedWriter, user_id: impl Into<String>) -> Self {
        Self {
            output,
            user_id: user_id.into(),
            targets: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn stdout(user_id: impl Into<String>) -> Self {
        let output: SharedWriter = Arc::new(Mutex::new(std::io::stdout()));
        Self::new(output, user_id)
    }

    /// Detaches every rendered transport.
    pub(crate) fn clear(&self) {
        if let Ok(mut targets) = self.targets.lock() {
            for (_, target) in std::mem::take(&mut *targets) {
                for subscription in target.subscriptions {
                    subscription.unsubscribe();
                }
            }
        }
    }
}

impl Renderer for TerminalRenderer {
    fn render(
        &self,
        transport: Arc<dyn ChatTransport>,
        target: &RenderTarget,
        watermark: Option<&str>,
    ) -> Result<()> {
        let mut targets = self
            .targets
            .lock()
            .map_err(|_| anyhow!("terminal renderer state is poisoned"))?;
        let rendered = targets.entry(target.as_str().to_string()).or_default();
        for subscription in rendered.subscriptions.drain(..) {
            subscription.unsubscribe();
        }

        if let Some(watermark) = watermark {
            if let Ok(mut shown) = rendered.shown.lock() {
                shown.insert(watermark);
            }
            write_line(&self.output, &format!("-- resumed after {watermark} --"));
        }

        let output = Arc::clone(&self.output);
        let shown = Arc::clone(&rendered.shown);
        let user_id = self.user_id.clone();
        rendered
            .subscriptions
            .push(transport.activities().subscribe(move |activity| {
                if let Some(line) = format_activity_line(activity, &user_id) {
                    let first_sighting = match (activity.activity_id(), shown.lock()) {
                        (Some(id), Ok(mut shown)) => shown.insert(id),
                        _ => true,
                    };
                    if first_sighting {
                        write_line(&output, &line);
                    }
                }
            }));

        let output = Arc::clone(&self.output);
        rendered
            .subscriptions
            .push(transport.connection_status().subscribe(move |status| {
                if let Some(line) = format_status_line(*status) {
                    write_line(&output, &line);
                }
            }));
        Ok(())
    }
}

fn write_line(output: &SharedWriter, line: &str) {
    if let Ok(mut output) = output.lock() {
        let _ = writeln!(output, "{line}");
        let _ = output.flush();
    }
}

/// Formats message activities from other participants; echoes of the local
/// user's own messages and non-message activities return `None`.
pub(crate) fn format_activity_line(activity: &Activity, user_id: &str) -> Option<String> {
    if !activity.is_message() || activity.sender_id() == Some(user_id) {
        return None;
    }
    let text = activity.text.as_deref().map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return None;
    }
    let sender = activity
        .from
        .as_ref()
        .and_then(|account| account.name.as_deref().or(Some(account.id.as_str())))
        .unwrap_or("agent");
    let line = match activity.timestamp_utc() {
        Some(timestamp) => format!("[{}] {sender}: {text}", timestamp.format("%H:%M:%S")),
        None => format!("{sender}: {text}"),
    };
    Some(line)
}

fn format_status_line(status: ConnectionStatus) -> Option<String> {
    match status {
        ConnectionStatus::Online => Some("-- connected --".to_string()),
        ConnectionStatus::ExpiredToken => Some("-- token expired, waiting for refresh --".to_string()),
        ConnectionStatus::FailedToConnect => Some("-- connection failed --".to_string()),
        ConnectionStatus::Ended => Some("-- conversation ended --".to_string()),
        ConnectionStatus::Uninitialized | ConnectionStatus::Connecting => None,
    }
}
