//! UI-agnostic conversation types
//!
//! These are the shapes that get persisted and handed to whichever front end
//! renders them. Nothing in here knows about terminals or HTTP.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single chat turn. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default = "epoch", deserialize_with = "lenient_time")]
    pub time: DateTime<Utc>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Unreadable or missing timestamps become the Unix epoch so the message
/// survives and simply sorts as oldest
fn lenient_time<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let parsed = match &value {
        serde_json::Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|time| time.with_timezone(&Utc))
            .ok(),
        serde_json::Value::Number(millis) => millis
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    };
    Ok(parsed.unwrap_or_else(epoch))
}

impl Message {
    /// Build a message stamped with the current wall-clock time
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            time: Utc::now(),
        }
    }
}

/// An ordered conversation. Serialized as the bare message list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session {
    pub messages: Vec<Message>,
}

impl Session {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn first(&self) -> Option<&Message> {
        self.messages.first()
    }

    /// Time of the last message, or the Unix epoch for an empty session
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.messages
            .last()
            .map(|m| m.time)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Session id to conversation, as persisted
pub type SessionMap = BTreeMap<String, Session>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_empty_session_uses_epoch() {
        let session = Session::default();
        assert_eq!(session.last_activity(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_session_is_plain_list() {
        let raw = r#"[{"role":"user","content":"Lisbon in May?","time":"2024-05-01T09:30:00.000Z"}]"#;
        let session: Session = serde_json::from_str(raw).unwrap();
        assert_eq!(session.len(), 1);
        assert_eq!(session.messages[0].role, Role::User);
        assert_eq!(session.last_activity().to_rfc3339(), "2024-05-01T09:30:00+00:00");
    }

    #[test]
    fn test_bad_time_falls_back_to_epoch() {
        let raw = r#"[
            {"role": "user", "content": "Oslo?", "time": ""},
            {"role": "assistant", "content": "Fjords.", "time": "yesterday"},
            {"role": "user", "content": "And Bergen?"}
        ]"#;
        let session: Session = serde_json::from_str(raw).unwrap();
        assert_eq!(session.len(), 3);
        assert!(session.messages.iter().all(|m| m.time == DateTime::<Utc>::UNIX_EPOCH));
    }
}
