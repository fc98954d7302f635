use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use shoptalk_types::models::{AccountKind, Business, Message, Participant, User};

use crate::Database;
use crate::models::{BusinessRow, MessageRow, UserRow};

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str, kind: AccountKind, name: &str) -> Result<User> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, kind, name) VALUES (?1, ?2, ?3)",
                rusqlite::params![username, kind.as_str(), name],
            )?;

            Ok(User {
                id: conn.last_insert_rowid(),
                username: username.to_string(),
                kind,
                name: name.to_string(),
            })
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.with_conn(|conn| Ok(query_user_by_id(conn, id)?.map(UserRow::into_user)))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.with_conn(|conn| Ok(query_user_by_username(conn, username)?.map(UserRow::into_user)))
    }

    // -- Businesses --

    pub fn create_business(
        &self,
        user_id: i64,
        description: &str,
        category: &str,
        location: &str,
        services: &[String],
    ) -> Result<Business> {
        let services_json = serde_json::to_string(services)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO businesses (user_id, description, category, location, services)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![user_id, description, category, location, services_json],
            )?;

            Ok(Business {
                id: conn.last_insert_rowid(),
                user_id,
                description: description.to_string(),
                category: category.to_string(),
                location: location.to_string(),
                services: services.to_vec(),
            })
        })
    }

    pub fn get_business_by_user(&self, user_id: i64) -> Result<Option<Business>> {
        self.with_conn(|conn| {
            Ok(query_business_by_user(conn, user_id)?.map(BusinessRow::into_business))
        })
    }

    pub fn list_businesses(&self) -> Result<Vec<Business>> {
        self.with_conn(|conn| {
            let rows = query_all_businesses(conn)?;
            Ok(rows.into_iter().map(BusinessRow::into_business).collect())
        })
    }

    /// Case-insensitive substring search over profile text. A query that
    /// matches no row falls back to the full directory so the ranking layer
    /// downstream always has candidates to order.
    pub fn search_businesses(&self, query: &str) -> Result<Vec<Business>> {
        self.with_conn(|conn| {
            let needle = query.trim();

            let rows = if needle.is_empty() {
                query_all_businesses(conn)?
            } else {
                let matched = query_matching_businesses(conn, needle)?;
                if matched.is_empty() {
                    query_all_businesses(conn)?
                } else {
                    matched
                }
            };

            Ok(rows.into_iter().map(BusinessRow::into_business).collect())
        })
    }

    // -- Messages --

    /// Append a message to the log. The assistant flag is derived from the
    /// sender here and nowhere else.
    pub fn create_message(
        &self,
        from: Participant,
        to: Participant,
        content: &str,
    ) -> Result<Message> {
        let now = Utc::now();
        // Fixed-width RFC 3339 so lexicographic order matches time order.
        let stored = now.to_rfc3339_opts(SecondsFormat::Micros, true);
        let is_ai_assistant = from.is_assistant();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (from_id, to_id, content, timestamp, is_ai_assistant)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![from.id(), to.id(), content, &stored, is_ai_assistant],
            )?;

            Ok(Message {
                id: conn.last_insert_rowid(),
                from_id: from,
                to_id: to,
                content: content.to_string(),
                // Parse the stored form back so the returned value equals a
                // later read of the same row.
                timestamp: stored.parse::<DateTime<Utc>>().unwrap_or(now),
                is_ai_assistant,
            })
        })
    }

    /// Full conversation between two participants, both directions, oldest
    /// first. Ties on timestamp break on the monotonic row id.
    pub fn get_messages(&self, a: Participant, b: Participant) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let rows = query_conversation(conn, a.id(), b.id())?;
            Ok(rows.into_iter().filter_map(MessageRow::into_message).collect())
        })
    }
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare("SELECT id, username, kind, name FROM users WHERE id = ?1")?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                kind: row.get(2)?,
                name: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare("SELECT id, username, kind, name FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                kind: row.get(2)?,
                name: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_business_by_user(conn: &Connection, user_id: i64) -> Result<Option<BusinessRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, description, category, location, services
         FROM businesses WHERE user_id = ?1",
    )?;

    let row = stmt
        .query_row([user_id], |row| {
            Ok(BusinessRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                description: row.get(2)?,
                category: row.get(3)?,
                location: row.get(4)?,
                services: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_all_businesses(conn: &Connection) -> Result<Vec<BusinessRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, description, category, location, services
         FROM businesses ORDER BY id",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(BusinessRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                description: row.get(2)?,
                category: row.get(3)?,
                location: row.get(4)?,
                services: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_matching_businesses(conn: &Connection, needle: &str) -> Result<Vec<BusinessRow>> {
    // SQLite LIKE is case-insensitive for ASCII, which covers the directory.
    let mut stmt = conn.prepare(
        "SELECT id, user_id, description, category, location, services
         FROM businesses
         WHERE description LIKE '%' || ?1 || '%'
            OR category    LIKE '%' || ?1 || '%'
            OR location    LIKE '%' || ?1 || '%'
            OR services    LIKE '%' || ?1 || '%'
         ORDER BY id",
    )?;

    let rows = stmt
        .query_map([needle], |row| {
            Ok(BusinessRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                description: row.get(2)?,
                category: row.get(3)?,
                location: row.get(4)?,
                services: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_conversation(conn: &Connection, a: i64, b: i64) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, from_id, to_id, content, timestamp, is_ai_assistant
         FROM messages
         WHERE (from_id = ?1 AND to_id = ?2) OR (from_id = ?2 AND to_id = ?1)
         ORDER BY timestamp ASC, id ASC",
    )?;

    let rows = stmt
        .query_map([a, b], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                from_id: row.get(1)?,
                to_id: row.get(2)?,
                content: row.get(3)?,
                timestamp: row.get(4)?,
                is_ai_assistant: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn human(id: i64) -> Participant {
        Participant::from_id(id).unwrap()
    }

    #[test]
    fn message_ids_strictly_increase() {
        let db = test_db();

        let first = db
            .create_message(human(10), human(11), "hello")
            .unwrap();
        let second = db
            .create_message(human(10), human(11), "again")
            .unwrap();
        let third = db
            .create_message(human(11), human(10), "reply")
            .unwrap();

        assert!(second.id > first.id);
        assert!(third.id > second.id);
    }

    #[test]
    fn conversation_is_bidirectional_and_ordered() {
        let db = test_db();

        db.create_message(human(10), human(11), "one").unwrap();
        db.create_message(human(11), human(10), "two").unwrap();
        db.create_message(human(10), human(11), "three").unwrap();
        // A different pair must not leak in.
        db.create_message(human(10), human(12), "other thread").unwrap();

        let thread = db.get_messages(human(10), human(11)).unwrap();
        let contents: Vec<&str> = thread.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);

        // Same thread regardless of which side asks.
        let mirrored = db.get_messages(human(11), human(10)).unwrap();
        assert_eq!(mirrored.len(), 3);
        assert_eq!(mirrored[0].id, thread[0].id);
    }

    #[test]
    fn repeated_reads_are_identical() {
        let db = test_db();

        db.create_message(human(5), Participant::Assistant, "hi").unwrap();
        db.create_message(Participant::Assistant, human(5), "hello").unwrap();

        let first = db.get_messages(human(5), Participant::Assistant).unwrap();
        let second = db.get_messages(human(5), Participant::Assistant).unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.content, b.content);
            assert_eq!(a.timestamp, b.timestamp);
        }
    }

    #[test]
    fn assistant_flag_tracks_sender() {
        let db = test_db();

        let from_user = db
            .create_message(human(5), Participant::Assistant, "question")
            .unwrap();
        let from_assistant = db
            .create_message(Participant::Assistant, human(5), "answer")
            .unwrap();

        assert!(!from_user.is_ai_assistant);
        assert!(from_assistant.is_ai_assistant);

        let thread = db.get_messages(human(5), Participant::Assistant).unwrap();
        assert_eq!(thread.len(), 2);
        assert!(!thread[0].is_ai_assistant);
        assert!(thread[1].is_ai_assistant);
    }

    #[test]
    fn equal_timestamps_break_ties_on_id() {
        let db = test_db();

        // Insert out of id order with one shared timestamp.
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, from_id, to_id, content, timestamp, is_ai_assistant)
                 VALUES (500, 10, 11, 'later', '2025-01-01T00:00:00.000000Z', 0)",
                [],
            )?;
            conn.execute(
                "INSERT INTO messages (id, from_id, to_id, content, timestamp, is_ai_assistant)
                 VALUES (400, 11, 10, 'earlier', '2025-01-01T00:00:00.000000Z', 0)",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let thread = db.get_messages(human(10), human(11)).unwrap();
        assert_eq!(thread[0].content, "earlier");
        assert_eq!(thread[1].content, "later");
    }

    #[test]
    fn search_narrows_to_matching_profiles() {
        let db = test_db();

        let hits = db.search_businesses("plumbing").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].category, "Home Services");
    }

    #[test]
    fn unmatched_search_falls_back_to_full_directory() {
        let db = test_db();

        let hits = db.search_businesses("need AC repair").unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let db = test_db();

        db.create_user("casey", AccountKind::Consumer, "Casey").unwrap();
        assert!(db.create_user("casey", AccountKind::Consumer, "Casey Two").is_err());
    }

    #[test]
    fn one_profile_per_user() {
        let db = test_db();

        let owner = db
            .create_user("plumbco", AccountKind::Business, "PlumbCo")
            .unwrap();
        db.create_business(owner.id, "Pipes fixed fast", "Home Services", "Austin, TX", &[])
            .unwrap();

        let second = db.create_business(owner.id, "Second profile", "Other", "Austin, TX", &[]);
        assert!(second.is_err());
    }

    #[test]
    fn missing_user_reads_as_none() {
        let db = test_db();
        assert!(db.get_user(99_999).unwrap().is_none());
    }

    #[test]
    fn seeded_directory_is_present() {
        let db = test_db();

        let all = db.list_businesses().unwrap();
        assert_eq!(all.len(), 3);

        let homefix = db.get_user_by_username("homefix").unwrap().unwrap();
        let profile = db.get_business_by_user(homefix.id).unwrap().unwrap();
        assert!(profile.services.iter().any(|s| s == "HVAC"));
    }
}
