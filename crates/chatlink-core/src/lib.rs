//! Foundational types shared across chatlink crates.
//!
//! Holds the credential and error types, the listener-based event stream used
//! by transports, and the session state that carries the current credential
//! and watermark across transport rebuilds.

pub mod atomic_io;
pub mod credential;
pub mod error;
pub mod event_stream;
pub mod session_state;
pub mod session_storage;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use credential::Credential;
pub use error::ChatlinkError;
pub use event_stream::{EventStream, Subscription};
pub use session_state::{SessionState, WATERMARK_STORAGE_KEY};
pub use session_storage::{FileSessionStorage, MemorySessionStorage, SessionStorage};
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms, is_expired_unix};
