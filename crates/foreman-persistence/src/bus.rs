//! Durable at-least-once message bus between roles.
//!
//! A message stays visible to [`MessageBus::poll`] until its recipient marks
//! it read. Delivery order per recipient is insertion order.

use std::sync::Arc;

use rusqlite::{params, Row};
use serde::Serialize;
use tracing::debug;

use foreman_models::{Clock, Message, MessageType, RoleName};

use crate::connection::ProjectDb;
use crate::error::Result;
use crate::time::{format_ts, parse_opt_ts, parse_ts};

const COLUMNS: &str = "id, from_role, to_role, type, payload, created_at, read_at";

struct MessageRow {
    id: i64,
    from_role: String,
    to_role: String,
    message_type: String,
    payload: String,
    created_at: String,
    read_at: Option<String>,
}

impl MessageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            from_role: row.get(1)?,
            to_role: row.get(2)?,
            message_type: row.get(3)?,
            payload: row.get(4)?,
            created_at: row.get(5)?,
            read_at: row.get(6)?,
        })
    }

    fn into_message(self) -> Result<Message> {
        Ok(Message {
            id: self.id,
            from: self.from_role.parse()?,
            to: self.to_role.parse()?,
            message_type: self.message_type.parse()?,
            payload: serde_json::from_str(&self.payload)?,
            created_at: parse_ts(&self.created_at)?,
            read_at: parse_opt_ts(self.read_at)?,
        })
    }
}

/// Inbox/outbox for inter-role notifications.
#[derive(Clone)]
pub struct MessageBus {
    db: ProjectDb,
    clock: Arc<dyn Clock>,
}

impl MessageBus {
    pub fn new(db: ProjectDb, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Append a message and return its id.
    pub fn send<P: Serialize>(
        &self,
        from: RoleName,
        to: RoleName,
        message_type: MessageType,
        payload: &P,
    ) -> Result<i64> {
        let payload = serde_json::to_string(payload)?;
        let created_at = format_ts(self.clock.now());
        let id = self.db.database().with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (from_role, to_role, type, payload, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    from.as_str(),
                    to.as_str(),
                    message_type.as_str(),
                    payload,
                    created_at
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        debug!(id, from = %from, to = %to, message_type = %message_type, "message sent");
        Ok(id)
    }

    /// Unread messages for `to`, oldest first, optionally of one type.
    pub fn poll(&self, to: RoleName, message_type: Option<MessageType>) -> Result<Vec<Message>> {
        self.db.database().with_conn(|conn| {
            let rows = match message_type {
                Some(ty) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {COLUMNS} FROM messages \
                         WHERE to_role = ?1 AND type = ?2 AND read_at IS NULL ORDER BY id"
                    ))?;
                    let rows = stmt
                        .query_map(params![to.as_str(), ty.as_str()], MessageRow::from_row)?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {COLUMNS} FROM messages \
                         WHERE to_role = ?1 AND read_at IS NULL ORDER BY id"
                    ))?;
                    let rows = stmt
                        .query_map(params![to.as_str()], MessageRow::from_row)?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                }
            };
            rows.into_iter().map(MessageRow::into_message).collect()
        })
    }

    /// Mark one message read. Returns `false` if it was already read or absent.
    pub fn mark_read(&self, id: i64) -> Result<bool> {
        let now = format_ts(self.clock.now());
        self.db.database().with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read_at = ?1 WHERE id = ?2 AND read_at IS NULL",
                params![now, id],
            )?;
            Ok(changed == 1)
        })
    }

    /// Mark every unread message for `to` read; returns how many changed.
    pub fn mark_all_read(&self, to: RoleName) -> Result<usize> {
        let now = format_ts(self.clock.now());
        self.db.database().with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE messages SET read_at = ?1 WHERE to_role = ?2 AND read_at IS NULL",
                params![now, to.as_str()],
            )?)
        })
    }

    pub fn unread_count(&self, to: RoleName) -> Result<usize> {
        self.db.database().with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE to_role = ?1 AND read_at IS NULL",
                params![to.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// Newest messages first, read or not.
    pub fn recent(&self, limit: usize) -> Result<Vec<Message>> {
        self.db.database().with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM messages ORDER BY id DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map(params![limit as i64], MessageRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(MessageRow::into_message).collect()
        })
    }
}
