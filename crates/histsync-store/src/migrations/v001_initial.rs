//! v001 -- Initial schema creation.
//!
//! One table per relay entity: `devices`, `enc_history_entries`,
//! `usage_data`, `dump_requests` and `deletion_requests`.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Device registry (append-only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS devices (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id           TEXT NOT NULL,
    device_id         TEXT NOT NULL,
    registration_ip   TEXT NOT NULL,
    registration_date TEXT NOT NULL               -- RFC-3339, UTC
);

CREATE INDEX IF NOT EXISTS idx_devices_user_id ON devices(user_id);

-- ----------------------------------------------------------------
-- Entry store: one row per (logical entry, destination mailbox)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS enc_history_entries (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    TEXT NOT NULL,
    device_id  TEXT NOT NULL,                     -- mailbox owner
    source_device_id TEXT NOT NULL,               -- device the entry came from
    enc_data   BLOB NOT NULL,                     -- opaque ciphertext
    nonce      BLOB NOT NULL,
    end_time   TEXT NOT NULL,                     -- RFC-3339, UTC, nanos
    entry_id   TEXT NOT NULL,
    read_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_entries_mailbox
    ON enc_history_entries(user_id, device_id);
CREATE INDEX IF NOT EXISTS idx_entries_identity
    ON enc_history_entries(user_id, source_device_id, end_time);
CREATE INDEX IF NOT EXISTS idx_entries_read_count
    ON enc_history_entries(read_count);

-- ----------------------------------------------------------------
-- Usage telemetry
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS usage_data (
    user_id             TEXT NOT NULL,
    device_id           TEXT NOT NULL,
    last_used           TEXT NOT NULL,
    num_entries_handled INTEGER NOT NULL DEFAULT 0,

    UNIQUE (user_id, device_id)
);

-- ----------------------------------------------------------------
-- Dump exchange
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS dump_requests (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id              TEXT NOT NULL,
    requesting_device_id TEXT NOT NULL,
    request_time         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_dump_requests_user_id ON dump_requests(user_id);

-- ----------------------------------------------------------------
-- Deletion requests: one row per destination device
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS deletion_requests (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id               TEXT NOT NULL,
    destination_device_id TEXT NOT NULL,
    send_time             TEXT NOT NULL,
    messages              TEXT NOT NULL,          -- JSON {"ids": [...]}
    read_count            INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_deletion_requests_destination
    ON deletion_requests(user_id, destination_device_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
