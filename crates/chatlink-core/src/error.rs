use thiserror::Error;

#[derive(Debug, Error)]
/// Enumerates failures surfaced by chatlink credential and transport calls.
pub enum ChatlinkError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("endpoint returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("malformed credential: {0}")]
    InvalidCredential(String),
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
    #[error("transport has ended")]
    TransportEnded,
}

impl ChatlinkError {
    /// Returns the upstream HTTP status when the failure carried one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Http(error) => error.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

/// Truncates an upstream body so error messages stay readable.
pub fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
