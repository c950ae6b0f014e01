//! Direct Line chat transport for chatlink sessions.
//!
//! Defines the transport contract consumed by the session lifecycle manager
//! (status and activity streams, in-place token refresh) together with a REST
//! polling implementation speaking the Direct Line v3 conversation shape.

pub mod activity;
pub mod connection_status;
pub mod directline_client;
pub mod directline_transport;
pub mod transport;

pub use activity::{Activity, ActivitySet, ChannelAccount, ConversationStart};
pub use connection_status::ConnectionStatus;
pub use directline_client::DirectLineClient;
pub use directline_transport::{DirectLineTransport, DirectLineTransportFactory};
pub use transport::{
    ChatTransport, TransportFactory, TransportOptions, DEFAULT_MAX_CONSECUTIVE_FAILURES,
    DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT_MS,
};
