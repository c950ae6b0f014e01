//! Direct Line activity payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const MESSAGE_ACTIVITY_TYPE: &str = "message";

fn default_activity_type() -> String {
    MESSAGE_ACTIVITY_TYPE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Sender or recipient of an activity.
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One chat activity; fields chatlink does not model are kept in `extra`.
pub struct Activity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default = "default_activity_type")]
    pub activity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Activity {
    pub fn message(from_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: None,
            activity_type: MESSAGE_ACTIVITY_TYPE.to_string(),
            from: Some(ChannelAccount {
                id: from_id.into(),
                name: None,
                role: Some("user".to_string()),
            }),
            text: Some(text.into()),
            timestamp: None,
            extra: Map::new(),
        }
    }

    /// Returns the id when it is present and non-empty.
    pub fn activity_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn is_message(&self) -> bool {
        self.activity_type == MESSAGE_ACTIVITY_TYPE
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.from.as_ref().map(|account| account.id.as_str())
    }

    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.timestamp.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|value| value.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Page of activities returned by a poll.
pub struct ActivitySet {
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Response to starting a conversation.
pub struct ConversationStart {
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(rename = "streamUrl", default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
}
