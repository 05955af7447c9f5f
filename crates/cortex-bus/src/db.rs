use rusqlite::{Connection, Result};

/// Initialise the bus table. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bus_entries (
            key         TEXT PRIMARY KEY,
            value       TEXT NOT NULL,
            expires_at  INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bus_expires
            ON bus_entries(expires_at);",
    )
}
