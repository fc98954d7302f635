use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

pub type UserId = i64;

/// Sender/recipient id standing in for the AI assistant on the wire and in
/// storage. Real user ids start at 1, so this value never collides with one.
pub const ASSISTANT_ID: UserId = 0;

/// One side of a conversation: a real user or the AI assistant.
///
/// On the wire this is a plain integer (the assistant is the reserved id 0,
/// matching the JSON clients already speak); inside the server it is a tagged
/// variant so assistant handling is explicit instead of sentinel comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Participant {
    Assistant,
    Human(UserId),
}

impl Participant {
    /// Maps a raw wire/storage id to a participant. Negative ids are invalid.
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            ASSISTANT_ID => Some(Self::Assistant),
            id if id > 0 => Some(Self::Human(id)),
            _ => None,
        }
    }

    pub fn id(&self) -> UserId {
        match self {
            Self::Assistant => ASSISTANT_ID,
            Self::Human(id) => *id,
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Self::Assistant)
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assistant => write!(f, "assistant"),
            Self::Human(id) => write!(f, "{}", id),
        }
    }
}

impl Serialize for Participant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.id())
    }
}

impl<'de> Deserialize<'de> for Participant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = i64::deserialize(deserializer)?;
        Participant::from_id(id)
            .ok_or_else(|| de::Error::custom(format!("invalid participant id {}", id)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Business,
    Consumer,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Consumer => "consumer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "business" => Some(Self::Business),
            "consumer" => Some(Self::Consumer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    pub name: String,
}

/// A business profile. One-to-one with a business-kind [`User`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    pub id: i64,
    pub user_id: UserId,
    pub description: String,
    pub category: String,
    pub location: String,
    pub services: Vec<String>,
}

/// A single chat message. The JSON encoding of this struct is also the
/// outbound push frame sent verbatim over a recipient's live channel.
///
/// `is_ai_assistant` is true exactly when the sender is the assistant; the
/// flag is derived at the single write site, never supplied by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub from_id: Participant,
    pub to_id: Participant,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_ai_assistant: bool,
}
