//! Database schema for the SQLite event source.

/// SQL schema for the notifications database.
pub const NOTIFICATIONS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    recipient_id TEXT NOT NULL,
    type TEXT NOT NULL,

    -- Originator (absent for system-generated records)
    actor_id TEXT,
    actor_display_name TEXT,
    actor_handle TEXT,
    actor_image_ref TEXT,

    subject_id TEXT,
    body TEXT,
    read INTEGER NOT NULL DEFAULT 0,

    -- Timestamps (Unix milliseconds)
    created_at INTEGER NOT NULL,
    updated_at INTEGER,

    -- Aggregation (JSON array of actors)
    actors TEXT,
    actor_count INTEGER
);

CREATE INDEX IF NOT EXISTS idx_notifications_recipient_created
    ON notifications(recipient_id, created_at);
"#;

/// Columns in select order, shared by every query.
pub const NOTIFICATION_COLUMNS: &str = "id, recipient_id, type, actor_id, actor_display_name, \
     actor_handle, actor_image_ref, subject_id, body, read, created_at, updated_at, actors, actor_count";
