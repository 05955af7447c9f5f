use std::sync::Mutex;

use rusqlite::{params, Connection};

use cortex_core::{CortexError, Result};

/// One persisted chat turn, as stored in the gateway's own `messages` table
/// and as served back over `GET /v1/threads/:id/messages`. The gateway is the system of record for raw turn text — the
/// memory service only ever reaches it through this endpoint.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    pub seq: i64,
}

/// Gateway-owned message store. One SQLite connection behind a `Mutex`,
/// matching the single-node trade-off the rest of this system makes for its
/// other stores.
pub struct MessageStore {
    conn: Mutex<Connection>,
}

impl MessageStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| CortexError::Database(e.to_string()))?;
        init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| CortexError::Database(e.to_string()))?;
        init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Appends a turn and returns its thread-local sequence number.
    pub fn append(&self, user_id: &str, thread_id: &str, role: &str, content: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().timestamp();
        let seq: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE thread_id = ?1",
                params![thread_id],
                |r| r.get(0),
            )
            .map_err(|e| CortexError::Database(e.to_string()))?;
        conn.execute(
            "INSERT INTO messages (thread_id, user_id, role, content, seq, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![thread_id, user_id, role, content, seq, now],
        )
        .map_err(|e| CortexError::Database(e.to_string()))?;
        Ok(seq)
    }

    /// Messages for a thread, in turn order, optionally starting after
    /// `since_seq` (the `sinceId` cursor the memory service's
    /// `GatewayThreadSource` passes for incremental audit windows).
    pub fn list_since(&self, thread_id: &str, since_seq: Option<i64>) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT role, content, seq FROM messages
                 WHERE thread_id = ?1 AND seq > ?2 ORDER BY seq ASC",
            )
            .map_err(|e| CortexError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![thread_id, since_seq.unwrap_or(0)], |r| {
                Ok(StoredMessage {
                    role: r.get(0)?,
                    content: r.get(1)?,
                    seq: r.get(2)?,
                })
            })
            .map_err(|e| CortexError::Database(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| CortexError::Database(e.to_string()))
    }

    /// The full transcript for a thread, oldest first — used to rebuild
    /// conversation history for context assembly.
    pub fn history(&self, thread_id: &str) -> Result<Vec<StoredMessage>> {
        self.list_since(thread_id, None)
    }
}

fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            thread_id   TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            role        TEXT NOT NULL,
            content     TEXT NOT NULL,
            seq         INTEGER NOT NULL,
            created_at  INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_thread_seq ON messages(thread_id, seq);",
    )
    .map_err(|e| CortexError::Database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_increasing_seq_per_thread() {
        let store = MessageStore::open_in_memory().unwrap();
        let s1 = store.append("u1", "t1", "user", "hello").unwrap();
        let s2 = store.append("u1", "t1", "assistant", "hi there").unwrap();
        assert_eq!(s1, 1);
        assert_eq!(s2, 2);
    }

    #[test]
    fn list_since_filters_by_cursor() {
        let store = MessageStore::open_in_memory().unwrap();
        store.append("u1", "t1", "user", "one").unwrap();
        store.append("u1", "t1", "assistant", "two").unwrap();
        store.append("u1", "t1", "user", "three").unwrap();

        let all = store.list_since("t1", None).unwrap();
        assert_eq!(all.len(), 3);

        let since = store.list_since("t1", Some(1)).unwrap();
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].content, "two");
    }

    #[test]
    fn threads_are_isolated() {
        let store = MessageStore::open_in_memory().unwrap();
        store.append("u1", "t1", "user", "hello").unwrap();
        store.append("u1", "t2", "user", "other thread").unwrap();
        assert_eq!(store.history("t1").unwrap().len(), 1);
        assert_eq!(store.history("t2").unwrap().len(), 1);
    }
}
