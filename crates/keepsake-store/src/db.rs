use rusqlite::{Connection, Result};

/// Initialise all Keepsake tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_recipients_table(conn)?;
    create_messages_table(conn)?;
    create_message_recipients_table(conn)?;
    create_cadence_settings_table(conn)?;
    Ok(())
}

fn create_recipients_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS recipients (
            id            TEXT PRIMARY KEY NOT NULL,
            user_id       TEXT NOT NULL,
            name          TEXT NOT NULL,
            email         TEXT,
            relationship  TEXT,
            created_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_recipients_user
            ON recipients(user_id);",
    )
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    // The sweep polls (status, trigger, release_date); the posthumous flow
    // polls (user_id, trigger). Both get an index.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id             TEXT PRIMARY KEY NOT NULL,
            user_id        TEXT NOT NULL,
            title          TEXT NOT NULL,
            body           TEXT NOT NULL DEFAULT '',
            attachments    TEXT NOT NULL DEFAULT '[]',  -- JSON array
            status         TEXT NOT NULL DEFAULT 'draft',
            trigger_kind   TEXT NOT NULL DEFAULT 'manual',
            release_date   TEXT,
            release_event  TEXT,
            sent_at        TEXT,
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_due
            ON messages(status, trigger_kind, release_date);
        CREATE INDEX IF NOT EXISTS idx_messages_user_trigger
            ON messages(user_id, trigger_kind);",
    )
}

fn create_message_recipients_table(conn: &Connection) -> Result<()> {
    // UNIQUE(message_id, recipient_id): one join row per pair, so token
    // issuance is an in-place refresh rather than an append.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS message_recipients (
            id                TEXT PRIMARY KEY NOT NULL,
            message_id        TEXT NOT NULL REFERENCES messages(id),
            recipient_id      TEXT NOT NULL REFERENCES recipients(id),
            token             TEXT UNIQUE,
            token_expires_at  TEXT,
            viewed_at         TEXT,
            created_at        TEXT NOT NULL,
            UNIQUE(message_id, recipient_id)
        );
        CREATE INDEX IF NOT EXISTS idx_message_recipients_message
            ON message_recipients(message_id);",
    )
}

fn create_cadence_settings_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cadence_settings (
            user_id       TEXT NOT NULL,
            recipient_id  TEXT NOT NULL REFERENCES recipients(id),
            cadence       TEXT NOT NULL,
            updated_at    TEXT NOT NULL,
            PRIMARY KEY (user_id, recipient_id)
        );",
    )
}
