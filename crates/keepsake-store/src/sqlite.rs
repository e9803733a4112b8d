use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use keepsake_core::types::{
    format_ts, new_id, parse_ts, Message, MessageRecipient, MessageStatus, Recipient, Trigger,
};
use rusqlite::{types::Type, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::store::{StatusUpdate, Store};

const MESSAGE_COLUMNS: &str = "id, user_id, title, body, attachments, status, trigger_kind,
     release_date, release_event, sent_at, created_at";

const MESSAGE_RECIPIENT_COLUMNS: &str =
    "id, message_id, recipient_id, token, token_expires_at, viewed_at";

/// SQLite-backed [`Store`].
///
/// Thread-safe: the connection sits behind a `Mutex`. Every engine write is
/// a single statement, so no transaction ever spans two work items.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an open connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open (or create) the database file with WAL journaling.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::new(conn)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }

    // --- authoring helpers (collaborator stand-ins, not part of Store) ------

    pub fn insert_recipient(&self, recipient: &Recipient) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO recipients (id, user_id, name, email, relationship, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                recipient.id,
                recipient.user_id,
                recipient.name,
                recipient.email,
                recipient.relationship,
                format_ts(Utc::now()),
            ],
        )?;
        debug!(recipient_id = %recipient.id, user_id = %recipient.user_id, "recipient inserted");
        Ok(())
    }

    pub fn insert_message(&self, message: &Message) -> Result<()> {
        let conn = self.conn()?;
        let attachments = serde_json::to_string(&message.attachments)?;
        let created = format_ts(message.created_at);
        conn.execute(
            "INSERT INTO messages
             (id, user_id, title, body, attachments, status, trigger_kind,
              release_date, release_event, sent_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            rusqlite::params![
                message.id,
                message.user_id,
                message.title,
                message.body,
                attachments,
                message.status.to_string(),
                message.trigger.to_string(),
                message.release_date.map(format_ts),
                message.release_event,
                message.sent_at.map(format_ts),
                created,
            ],
        )?;
        debug!(message_id = %message.id, trigger = %message.trigger, "message inserted");
        Ok(())
    }

    /// Attach a recipient to a message. Idempotent: returns the existing
    /// join row id when the pair is already linked.
    pub fn link_recipient(&self, message_id: &str, recipient_id: &str) -> Result<String> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO message_recipients (id, message_id, recipient_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![new_id(), message_id, recipient_id, format_ts(Utc::now())],
        )?;
        let id = conn.query_row(
            "SELECT id FROM message_recipients WHERE message_id = ?1 AND recipient_id = ?2",
            rusqlite::params![message_id, recipient_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn set_cadence(&self, user_id: &str, recipient_id: &str, cadence: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO cadence_settings (user_id, recipient_id, cadence, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, recipient_id)
             DO UPDATE SET cadence = excluded.cadence, updated_at = excluded.updated_at",
            rusqlite::params![user_id, recipient_id, cadence, format_ts(Utc::now())],
        )?;
        info!(user_id, recipient_id, cadence, "cadence saved");
        Ok(())
    }

    /// Every message a user owns, oldest first (dashboard view).
    pub fn list_messages(&self, user_id: &str) -> Result<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE user_id = ?1 ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map([user_id], row_to_message)?;
        Ok(collect_rows(rows, "messages"))
    }
}

impl Store for SqliteStore {
    fn fetch_eligible_messages(
        &self,
        user_id: &str,
        trigger: Trigger,
        statuses: &[MessageStatus],
    ) -> Result<Vec<Message>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (0..statuses.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE user_id = ?1 AND trigger_kind = ?2 AND status IN ({placeholders})
             ORDER BY created_at, id"
        );

        let mut params = vec![user_id.to_string(), trigger.to_string()];
        params.extend(statuses.iter().map(|s| s.to_string()));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), row_to_message)?;
        Ok(collect_rows(rows, "messages"))
    }

    fn fetch_due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE status = 'scheduled' AND trigger_kind = 'scheduled'
               AND release_date IS NOT NULL AND release_date <= ?1
             ORDER BY release_date, created_at, id"
        ))?;
        let rows = stmt.query_map([format_ts(now)], row_to_message)?;
        Ok(collect_rows(rows, "messages"))
    }

    fn fetch_message(&self, message_id: &str) -> Result<Option<Message>> {
        let conn = self.conn()?;
        let message = conn
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                [message_id],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    fn fetch_recipients_for(&self, message_id: &str) -> Result<Vec<(Recipient, MessageRecipient)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT r.id, r.user_id, r.name, r.email, r.relationship,
                    mr.id, mr.message_id, mr.recipient_id, mr.token,
                    mr.token_expires_at, mr.viewed_at
             FROM message_recipients mr
             JOIN recipients r ON r.id = mr.recipient_id
             WHERE mr.message_id = ?1
             ORDER BY mr.created_at, mr.id",
        )?;
        let rows = stmt.query_map([message_id], |row| {
            let recipient = Recipient {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
                email: row.get(3)?,
                relationship: row.get(4)?,
            };
            let link = MessageRecipient {
                id: row.get(5)?,
                message_id: row.get(6)?,
                recipient_id: row.get(7)?,
                token: row.get(8)?,
                token_expires_at: opt_ts(row, 9)?,
                viewed_at: opt_ts(row, 10)?,
            };
            Ok((recipient, link))
        })?;
        Ok(collect_rows(rows, "message_recipients"))
    }

    fn fetch_cadence(&self, user_id: &str, recipient_id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let cadence = conn
            .query_row(
                "SELECT cadence FROM cadence_settings WHERE user_id = ?1 AND recipient_id = ?2",
                [user_id, recipient_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(cadence)
    }

    fn update_message_status(
        &self,
        message_id: &str,
        expected: MessageStatus,
        new_status: MessageStatus,
        fields: StatusUpdate,
    ) -> Result<bool> {
        if !expected.can_advance_to(new_status) {
            return Err(StoreError::IllegalTransition {
                id: message_id.to_string(),
                from: expected.to_string(),
                to: new_status.to_string(),
            });
        }

        let now = Utc::now();
        // status = sent ⇒ sent_at is set, even if the caller forgot it.
        let sent_at = match (new_status, fields.sent_at) {
            (MessageStatus::Sent, None) => Some(now),
            (_, at) => at,
        };

        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE messages SET
                status       = ?1,
                updated_at   = ?2,
                sent_at      = COALESCE(?3, sent_at),
                trigger_kind = COALESCE(?4, trigger_kind),
                release_date = COALESCE(?5, release_date)
             WHERE id = ?6 AND status = ?7",
            rusqlite::params![
                new_status.to_string(),
                format_ts(now),
                sent_at.map(format_ts),
                fields.trigger.map(|t| t.to_string()),
                fields.release_date.map(format_ts),
                message_id,
                expected.to_string(),
            ],
        )?;

        if n == 0 {
            debug!(message_id, %expected, %new_status, "guarded update matched no row");
        }
        Ok(n > 0)
    }

    fn upsert_token(
        &self,
        message_recipient_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE message_recipients SET token = ?1, token_expires_at = ?2 WHERE id = ?3",
            rusqlite::params![token, format_ts(expires_at), message_recipient_id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "message_recipient",
                id: message_recipient_id.to_string(),
            });
        }
        Ok(())
    }

    fn find_by_token(&self, token: &str) -> Result<Option<MessageRecipient>> {
        let conn = self.conn()?;
        let link = conn
            .query_row(
                &format!(
                    "SELECT {MESSAGE_RECIPIENT_COLUMNS} FROM message_recipients WHERE token = ?1"
                ),
                [token],
                row_to_message_recipient,
            )
            .optional()?;
        Ok(link)
    }

    fn mark_viewed(&self, token: &str, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE message_recipients SET viewed_at = ?1
             WHERE token = ?2 AND viewed_at IS NULL",
            rusqlite::params![format_ts(at), token],
        )?;
        Ok(n > 0)
    }
}

/// Keep good rows, log and drop rows that fail to decode.
fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
    table: &'static str,
) -> Vec<T> {
    rows.filter_map(|r| match r {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(table, error = %e, "skipping undecodable row");
            None
        }
    })
    .collect()
}

fn conversion_error(idx: usize, reason: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, reason.into())
}

fn req_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).ok_or_else(|| conversion_error(idx, format!("bad timestamp: {raw}")))
}

fn opt_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_ts(&raw)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, format!("bad timestamp: {raw}"))),
        None => Ok(None),
    }
}

/// Column order follows MESSAGE_COLUMNS.
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let attachments: Vec<String> = serde_json::from_str(&row.get::<_, String>(4)?)
        .map_err(|e| conversion_error(4, e.to_string()))?;
    let status: MessageStatus = row
        .get::<_, String>(5)?
        .parse()
        .map_err(|e: String| conversion_error(5, e))?;
    let trigger: Trigger = row
        .get::<_, String>(6)?
        .parse()
        .map_err(|e: String| conversion_error(6, e))?;
    Ok(Message {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        attachments,
        status,
        trigger,
        release_date: opt_ts(row, 7)?,
        release_event: row.get(8)?,
        sent_at: opt_ts(row, 9)?,
        created_at: req_ts(row, 10)?,
    })
}

fn row_to_message_recipient(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecipient> {
    Ok(MessageRecipient {
        id: row.get(0)?,
        message_id: row.get(1)?,
        recipient_id: row.get(2)?,
        token: row.get(3)?,
        token_expires_at: opt_ts(row, 4)?,
        viewed_at: opt_ts(row, 5)?,
    })
}
