//! Credential issued by the token provider.

use serde::{Deserialize, Serialize};

use crate::ChatlinkError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Token (and optionally a conversation id) authorizing one transport session.
///
/// A credential is replaced wholesale on refresh; nothing mutates its fields.
pub struct Credential {
    pub token: String,
    #[serde(
        rename = "conversationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub conversation_id: Option<String>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            conversation_id: None,
        }
    }

    pub fn with_conversation(token: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            conversation_id: Some(conversation_id.into()),
        }
    }

    /// Parses a token provider payload, rejecting blank tokens.
    ///
    /// Extra fields such as `expires_in` or `streamUrl` are ignored; a blank
    /// `conversationId` is treated as absent.
    pub fn from_json_slice(raw: &[u8]) -> Result<Self, ChatlinkError> {
        let parsed = serde_json::from_slice::<Credential>(raw)?;
        parsed.validated()
    }

    pub fn validated(self) -> Result<Self, ChatlinkError> {
        let token = self.token.trim();
        if token.is_empty() {
            return Err(ChatlinkError::InvalidCredential(
                "token provider returned an empty token".to_string(),
            ));
        }
        Ok(Self {
            token: token.to_string(),
            conversation_id: self
                .conversation_id
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        })
    }
}
