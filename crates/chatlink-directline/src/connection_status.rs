use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Connection states reported by a chat transport.
///
/// Discriminants match the integer codes used by Direct Line clients so
/// external status payloads can be decoded with [`ConnectionStatus::from_code`].
pub enum ConnectionStatus {
    Uninitialized = 0,
    Connecting = 1,
    Online = 2,
    ExpiredToken = 3,
    FailedToConnect = 4,
    Ended = 5,
}

impl ConnectionStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Uninitialized),
            1 => Some(Self::Connecting),
            2 => Some(Self::Online),
            3 => Some(Self::ExpiredToken),
            4 => Some(Self::FailedToConnect),
            5 => Some(Self::Ended),
            _ => None,
        }
    }

    /// Statuses after which the transport will not recover on its own.
    pub fn is_disconnect(self) -> bool {
        matches!(self, Self::FailedToConnect | Self::Ended)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Online => "online",
            Self::ExpiredToken => "expired_token",
            Self::FailedToConnect => "failed_to_connect",
            Self::Ended => "ended",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
