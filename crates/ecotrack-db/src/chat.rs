use anyhow::Result;
use rusqlite::params;
use uuid::Uuid;

use ecotrack_types::models::ChatMessage;

use crate::Database;
use crate::models::{parse_timestamp, parse_uuid, timestamp};

impl Database {
    // -- Chat --

    pub fn insert_chat_message(&self, msg: &ChatMessage) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO chat_messages (id, sender_id, receiver_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    msg.id.to_string(),
                    msg.sender_id.to_string(),
                    msg.receiver_id.to_string(),
                    msg.content,
                    timestamp(msg.created_at),
                ],
            )?;
            Ok(())
        })
    }

    /// The newest `limit` messages exchanged between two users, returned in
    /// chronological order.
    pub fn chat_history(&self, a: Uuid, b: Uuid, limit: u32) -> Result<Vec<ChatMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, content, created_at
                 FROM chat_messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
            )?;
            let mut rows = stmt
                .query_map(params![a.to_string(), b.to_string(), limit], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.reverse();
            Ok(rows
                .into_iter()
                .map(|(id, sender_id, receiver_id, content, created_at)| ChatMessage {
                    id: parse_uuid(&id),
                    sender_id: parse_uuid(&sender_id),
                    receiver_id: parse_uuid(&receiver_id),
                    content,
                    created_at: parse_timestamp(&created_at),
                })
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::test_support::new_user;

    fn message(from: Uuid, to: Uuid, content: &str, offset_secs: i64) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            sender_id: from,
            receiver_id: to,
            content: content.into(),
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn history_is_chronological_and_capped() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user(&new_user("a@example.com")).unwrap().unwrap().id;
        let b = db.create_user(&new_user("b@example.com")).unwrap().unwrap().id;
        let c = db.create_user(&new_user("c@example.com")).unwrap().unwrap().id;

        db.insert_chat_message(&message(a, b, "one", 0)).unwrap();
        db.insert_chat_message(&message(b, a, "two", 1)).unwrap();
        db.insert_chat_message(&message(a, c, "elsewhere", 2)).unwrap();
        db.insert_chat_message(&message(a, b, "three", 3)).unwrap();

        let all: Vec<String> = db
            .chat_history(b, a, 100)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(all, vec!["one", "two", "three"]);

        let last_two: Vec<String> = db
            .chat_history(a, b, 2)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(last_two, vec!["two", "three"]);
    }
}
