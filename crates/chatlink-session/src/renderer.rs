use std::sync::Arc;

use anyhow::Result;
use chatlink_directline::ChatTransport;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Identifies where a chat is rendered (a page element id, a terminal pane).
pub struct RenderTarget(String);

impl RenderTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RenderTarget {
    fn default() -> Self {
        Self::new("webchat")
    }
}

impl std::fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Presents a transport's conversation.
///
/// Rendering into a target that already shows a chat replaces that chat.
/// `watermark` is the last activity id the user has already seen.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        transport: Arc<dyn ChatTransport>,
        target: &RenderTarget,
        watermark: Option<&str>,
    ) -> Result<()>;
}
