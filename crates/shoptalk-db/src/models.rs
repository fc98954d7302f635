//! Database row types. These map directly to sqlite rows and are converted
//! into the shared API models before leaving this crate; conversions are
//! lenient about rows an operator may have edited by hand.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use shoptalk_types::models::{AccountKind, Business, Message, Participant, User};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub kind: String,
    pub name: String,
}

impl UserRow {
    pub fn into_user(self) -> User {
        let kind = AccountKind::parse(&self.kind).unwrap_or_else(|| {
            warn!("Corrupt account kind '{}' on user {}", self.kind, self.id);
            AccountKind::Consumer
        });

        User {
            id: self.id,
            username: self.username,
            kind,
            name: self.name,
        }
    }
}

pub struct BusinessRow {
    pub id: i64,
    pub user_id: i64,
    pub description: String,
    pub category: String,
    pub location: String,
    pub services: String,
}

impl BusinessRow {
    pub fn into_business(self) -> Business {
        let services = serde_json::from_str(&self.services).unwrap_or_else(|e| {
            warn!("Corrupt services on business {}: {}", self.id, e);
            Vec::new()
        });

        Business {
            id: self.id,
            user_id: self.user_id,
            description: self.description,
            category: self.category,
            location: self.location,
            services,
        }
    }
}

pub struct MessageRow {
    pub id: i64,
    pub from_id: i64,
    pub to_id: i64,
    pub content: String,
    pub timestamp: String,
    pub is_ai_assistant: bool,
}

impl MessageRow {
    /// Returns `None` (and logs) when the stored participant ids are out of
    /// range; such a row cannot be represented and is skipped on read.
    pub fn into_message(self) -> Option<Message> {
        let from_id = stored_participant(self.from_id, self.id)?;
        let to_id = stored_participant(self.to_id, self.id)?;

        Some(Message {
            id: self.id,
            from_id,
            to_id,
            content: self.content,
            timestamp: parse_timestamp(&self.timestamp, self.id),
            is_ai_assistant: self.is_ai_assistant,
        })
    }
}

fn stored_participant(raw: i64, message_id: i64) -> Option<Participant> {
    let participant = Participant::from_id(raw);
    if participant.is_none() {
        warn!(
            "Skipping message {} with out-of-range participant id {}",
            message_id, raw
        );
    }
    participant
}

fn parse_timestamp(raw: &str, message_id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') writes "YYYY-MM-DD HH:MM:SS" without a
            // timezone. Parse as naive UTC and convert.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on message {}: {}", raw, message_id, e);
            DateTime::default()
        })
}
