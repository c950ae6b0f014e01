//! Session continuity for chatlink clients.
//!
//! Wires a token provider, a transport factory and a renderer together and
//! keeps the chat alive across token expiry (proactive refresh) or transport
//! disconnects (reactive rebuild), tracking the watermark so re-rendered
//! history resumes where the user left off.

pub mod lifecycle;
pub mod renderer;
pub mod token_provider;
pub mod watermark_tracker;

pub use lifecycle::{
    LifecycleHandle, RefreshStrategy, SessionPhase, TransportLifecycleConfig,
    TransportLifecycleManager, DEFAULT_REFRESH_INTERVAL, MAX_REFRESH_INTERVAL,
};
pub use renderer::{RenderTarget, Renderer};
pub use token_provider::{
    HttpTokenProvider, TokenEndpoint, TokenProvider, CONVERSATIONS_PATH, DIRECTLINE_TOKEN_PATH,
};
pub use watermark_tracker::track_watermark;
