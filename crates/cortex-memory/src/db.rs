use rusqlite::{Connection, Result};

/// Initialise memory-service tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_memories_table(conn)?;
    create_fts_index(conn)?;
    create_audits_table(conn)?;
    create_thread_summaries_table(conn)?;
    create_user_profiles_table(conn)?;
    create_pending_messages_table(conn)?;
    create_cadence_state_table(conn)?;
    create_topic_stability_table(conn)?;
    Ok(())
}

fn create_memories_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memories (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            thread_id       TEXT,
            content         TEXT NOT NULL,
            entities        TEXT NOT NULL DEFAULT '[]',
            priority        REAL NOT NULL DEFAULT 0.5,
            confidence      REAL NOT NULL DEFAULT 0.5,
            tier            TEXT NOT NULL CHECK (tier IN ('TIER1','TIER2','TIER3')),
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL,
            last_seen_ts    INTEGER NOT NULL,
            repeats         INTEGER NOT NULL DEFAULT 1,
            thread_set      TEXT NOT NULL DEFAULT '[]',
            redaction_map   TEXT NOT NULL DEFAULT '{}',
            deleted_at      INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_memories_user_updated
            ON memories(user_id, updated_at DESC);
        CREATE INDEX IF NOT EXISTS idx_memories_user_tier
            ON memories(user_id, tier);",
    )
}

/// FTS5 external-content table over `memories.content`. content_rowid
/// defaults to the implicit rowid of `memories` (not WITHOUT ROWID), so
/// `rowid` lines up with `memories.rowid` for every live row. Synced
/// manually on write; drift is detected and repaired on the read path
/// (see recall.rs) rather than trusting triggers to never miss a case.
fn create_fts_index(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts
            USING fts5(content, content='memories', content_rowid='rowid');",
    )
}

fn create_audits_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS audits (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            thread_id       TEXT NOT NULL,
            start_msg_id    INTEGER NOT NULL,
            end_msg_id      INTEGER NOT NULL,
            score           REAL NOT NULL,
            saved           INTEGER NOT NULL,
            created_at      INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audits_user
            ON audits(user_id, created_at DESC);",
    )
}

fn create_thread_summaries_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS thread_summaries (
            thread_id   TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            summary     TEXT NOT NULL,
            updated_at  INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_thread_summaries_user
            ON thread_summaries(user_id, updated_at DESC);",
    )
}

fn create_user_profiles_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_profiles (
            user_id     TEXT PRIMARY KEY,
            payload     TEXT NOT NULL,
            updated_at  INTEGER NOT NULL
        );",
    )
}

/// Turns buffered between audit passes. Drained (not just read) once an
/// audit window fires for a thread.
fn create_pending_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS pending_messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         TEXT NOT NULL,
            thread_id       TEXT NOT NULL,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            token_estimate  INTEGER NOT NULL,
            created_at      INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_pending_thread
            ON pending_messages(thread_id, id);",
    )
}

fn create_cadence_state_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cadence_state (
            thread_id       TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            msg_count       INTEGER NOT NULL DEFAULT 0,
            token_count     INTEGER NOT NULL DEFAULT 0,
            last_audit_at   INTEGER NOT NULL
        );",
    )
}

/// Per-`(user, topic)` "seen in batches" counter for the research trigger.
fn create_topic_stability_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS topic_stability (
            user_id         TEXT NOT NULL,
            topic           TEXT NOT NULL,
            seen_batches    INTEGER NOT NULL DEFAULT 0,
            updated_at      INTEGER NOT NULL,
            PRIMARY KEY (user_id, topic)
        );",
    )
}
