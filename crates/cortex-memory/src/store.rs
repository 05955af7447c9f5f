use std::sync::Mutex;

use cortex_core::Tier;
use rusqlite::{params, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use crate::dedup::{similarity, SUPERSEDE_THRESHOLD};
use crate::error::{MemoryError, Result};
use crate::redact::redact;
use crate::types::{
    AuditRecord, CadenceState, Memory, PendingMessage, ThreadSummary, UserProfile,
};

/// Owns the memory-service SQLite connection. A single `Mutex<Connection>`
/// is sufficient at the single-node target this system ships for.
/// Mutation discipline: only this store writes `memories`,
/// `audits`, `thread_summaries`, `pending_messages`, and `cadence_state`.
pub struct MemoryStore {
    db: Mutex<rusqlite::Connection>,
}

impl MemoryStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        crate::db::init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        crate::db::init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Explicit save (`POST /v1/memories`). Redacts PII, then checks for a
    /// near-duplicate owned by the same user (similarity >= 0.75 is treated
    /// as an update, id unchanged) before deciding insert vs. supersede.
    pub fn save_explicit(
        &self,
        user_id: &str,
        thread_id: &str,
        content: &str,
        priority: Option<f64>,
        tier: Option<Tier>,
    ) -> Result<Memory> {
        let (redacted, redaction_map) = redact(content);
        let db = self.db.lock().unwrap();
        let now = now_ms();

        let candidates = existing_for_user(&db, user_id)?;
        if let Some(existing) = candidates
            .iter()
            .find(|m| similarity(&m.content, &redacted) >= SUPERSEDE_THRESHOLD)
        {
            return supersede(&db, existing, &redacted, thread_id, now);
        }

        let id = Uuid::now_v7().to_string();
        let tier = tier.unwrap_or(Tier::Tier1);
        let priority = priority.unwrap_or(0.9);
        let thread_set = serde_json::to_string(&vec![thread_id.to_string()])?;
        let entities = serde_json::to_string(&Vec::<String>::new())?;

        db.execute(
            "INSERT INTO memories
             (id, user_id, thread_id, content, entities, priority, confidence, tier,
              created_at, updated_at, last_seen_ts, repeats, thread_set, redaction_map, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0.9, ?7, ?8, ?8, ?8, 1, ?9, ?10, NULL)",
            params![
                id,
                user_id,
                thread_id,
                redacted,
                entities,
                priority,
                tier.to_string(),
                now,
                thread_set,
                redaction_map.to_string(),
            ],
        )?;
        sync_fts_insert(&db, &id, &redacted)?;

        get_by_id(&db, &id)?.ok_or(MemoryError::NotFound { id })
    }

    /// Ingest-path save: same supersede logic, but tier/priority/confidence
    /// come from the scoring pipeline rather than defaulting to TIER1.
    pub fn save_from_audit(
        &self,
        user_id: &str,
        thread_id: &str,
        content: &str,
        tier: Tier,
        priority: f64,
        confidence: f64,
    ) -> Result<Memory> {
        let (redacted, redaction_map) = redact(content);
        let db = self.db.lock().unwrap();
        let now = now_ms();

        let candidates = existing_for_user(&db, user_id)?;
        if let Some(existing) = candidates
            .iter()
            .find(|m| similarity(&m.content, &redacted) >= SUPERSEDE_THRESHOLD)
        {
            return supersede(&db, existing, &redacted, thread_id, now);
        }

        let id = Uuid::now_v7().to_string();
        let thread_set = serde_json::to_string(&vec![thread_id.to_string()])?;
        let entities = serde_json::to_string(&Vec::<String>::new())?;

        db.execute(
            "INSERT INTO memories
             (id, user_id, thread_id, content, entities, priority, confidence, tier,
              created_at, updated_at, last_seen_ts, repeats, thread_set, redaction_map, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?9, 1, ?10, ?11, NULL)",
            params![
                id,
                user_id,
                thread_id,
                redacted,
                entities,
                priority,
                confidence,
                tier.to_string(),
                now,
                thread_set,
                redaction_map.to_string(),
            ],
        )?;
        sync_fts_insert(&db, &id, &redacted)?;

        get_by_id(&db, &id)?.ok_or(MemoryError::NotFound { id })
    }

    pub fn get(&self, id: &str) -> Result<Option<Memory>> {
        let db = self.db.lock().unwrap();
        get_by_id(&db, id)
    }

    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Memory>> {
        let db = self.db.lock().unwrap();
        existing_for_user(&db, user_id)
    }

    pub fn update_content(&self, id: &str, content: &str) -> Result<Memory> {
        let (redacted, redaction_map) = redact(content);
        let db = self.db.lock().unwrap();
        let now = now_ms();
        let n = db.execute(
            "UPDATE memories SET content = ?1, redaction_map = ?2, updated_at = ?3
             WHERE id = ?4 AND deleted_at IS NULL",
            params![redacted, redaction_map.to_string(), now, id],
        )?;
        if n == 0 {
            return Err(MemoryError::NotFound { id: id.to_string() });
        }
        resync_fts(&db, id, &redacted)?;
        get_by_id(&db, id)?.ok_or(MemoryError::NotFound { id: id.to_string() })
    }

    /// Soft delete. Cascades to the FTS shadow row so it no longer
    /// surfaces via keyword search.
    pub fn delete(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = now_ms();
        let n = db.execute(
            "UPDATE memories SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![now, id],
        )?;
        if n == 0 {
            return Err(MemoryError::NotFound { id: id.to_string() });
        }
        delete_fts_row(&db, id)?;
        Ok(())
    }

    pub fn record_audit(&self, audit: &AuditRecord) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO audits (id, user_id, thread_id, start_msg_id, end_msg_id, score, saved, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                audit.id,
                audit.user_id,
                audit.thread_id,
                audit.start_msg_id,
                audit.end_msg_id,
                audit.score,
                audit.saved,
                audit.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn push_pending_message(
        &self,
        user_id: &str,
        thread_id: &str,
        role: &str,
        content: &str,
        token_estimate: u32,
    ) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let now = now_ms();
        db.execute(
            "INSERT INTO pending_messages (user_id, thread_id, role, content, token_estimate, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, thread_id, role, content, token_estimate, now],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Drain (read + delete) all pending messages for a thread, oldest first.
    pub fn drain_pending_messages(&self, thread_id: &str) -> Result<Vec<PendingMessage>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, thread_id, role, content, token_estimate, created_at
             FROM pending_messages WHERE thread_id = ?1 ORDER BY id ASC",
        )?;
        let rows: Vec<PendingMessage> = stmt
            .query_map(params![thread_id], |r| {
                Ok(PendingMessage {
                    id: r.get(0)?,
                    user_id: r.get(1)?,
                    thread_id: r.get(2)?,
                    role: r.get(3)?,
                    content: r.get(4)?,
                    token_estimate: r.get(5)?,
                    created_at: r.get(6)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        db.execute(
            "DELETE FROM pending_messages WHERE thread_id = ?1",
            params![thread_id],
        )?;
        Ok(rows)
    }

    pub fn get_cadence_state(&self, thread_id: &str, user_id: &str) -> Result<CadenceState> {
        let db = self.db.lock().unwrap();
        let existing: Option<(u32, u32, i64)> = db
            .query_row(
                "SELECT msg_count, token_count, last_audit_at FROM cadence_state WHERE thread_id = ?1",
                params![thread_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;

        Ok(match existing {
            Some((msg_count, token_count, last_audit_at)) => CadenceState {
                thread_id: thread_id.to_string(),
                user_id: user_id.to_string(),
                msg_count,
                token_count,
                last_audit_at,
            },
            None => CadenceState {
                thread_id: thread_id.to_string(),
                user_id: user_id.to_string(),
                msg_count: 0,
                token_count: 0,
                last_audit_at: now_ms(),
            },
        })
    }

    pub fn save_cadence_state(&self, state: &CadenceState) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO cadence_state (thread_id, user_id, msg_count, token_count, last_audit_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(thread_id) DO UPDATE SET
                msg_count = excluded.msg_count,
                token_count = excluded.token_count,
                last_audit_at = excluded.last_audit_at",
            params![
                state.thread_id,
                state.user_id,
                state.msg_count,
                state.token_count,
                state.last_audit_at,
            ],
        )?;
        Ok(())
    }

    pub fn load_thread_summary(&self, thread_id: &str) -> Result<Option<ThreadSummary>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT thread_id, user_id, summary, updated_at FROM thread_summaries WHERE thread_id = ?1",
            params![thread_id],
            |r| {
                Ok(ThreadSummary {
                    thread_id: r.get(0)?,
                    user_id: r.get(1)?,
                    summary: r.get(2)?,
                    updated_at: r.get(3)?,
                })
            },
        )
        .optional()
        .map_err(MemoryError::from)
    }

    pub fn save_thread_summary(&self, summary: &ThreadSummary) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO thread_summaries (thread_id, user_id, summary, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(thread_id) DO UPDATE SET
                summary = excluded.summary, updated_at = excluded.updated_at",
            params![summary.thread_id, summary.user_id, summary.summary, summary.updated_at],
        )?;
        Ok(())
    }

    pub fn load_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let db = self.db.lock().unwrap();
        let row: Option<(String, i64)> = db
            .query_row(
                "SELECT payload, updated_at FROM user_profiles WHERE user_id = ?1",
                params![user_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        match row {
            Some((payload, updated_at)) => Ok(Some(UserProfile {
                user_id: user_id.to_string(),
                payload: serde_json::from_str(&payload)?,
                updated_at,
            })),
            None => Ok(None),
        }
    }

    pub fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        let db = self.db.lock().unwrap();
        let payload = serde_json::to_string(&profile.payload)?;
        db.execute(
            "INSERT INTO user_profiles (user_id, payload, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
            params![profile.user_id, payload, profile.updated_at],
        )?;
        Ok(())
    }

    /// Most-recent thread summaries for a user, for `GET /v1/conversations`.
    pub fn recent_conversations(
        &self,
        user_id: &str,
        exclude_thread_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ThreadSummary>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT thread_id, user_id, summary, updated_at FROM thread_summaries
             WHERE user_id = ?1 AND (?2 IS NULL OR thread_id != ?2)
             ORDER BY updated_at DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![user_id, exclude_thread_id, limit as i64], |r| {
            Ok(ThreadSummary {
                thread_id: r.get(0)?,
                user_id: r.get(1)?,
                summary: r.get(2)?,
                updated_at: r.get(3)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Raw FTS5 MATCH search, used by recall.rs. Drift-checked by the
    /// caller before this runs.
    pub(crate) fn fts_search(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<(Memory, f64)>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT m.id, m.user_id, m.thread_id, m.content, m.entities, m.priority,
                    m.confidence, m.tier, m.created_at, m.updated_at, m.last_seen_ts,
                    m.repeats, m.thread_set, m.redaction_map, m.deleted_at, bm25(memories_fts) as rank
             FROM memories m
             JOIN memories_fts f ON m.rowid = f.rowid
             WHERE m.user_id = ?1 AND m.deleted_at IS NULL AND memories_fts MATCH ?2
             ORDER BY rank LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![user_id, query, limit as i64], |row| {
            let rank: f64 = row.get(15)?;
            Ok((row_to_memory(row)?, -rank))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Counts used for FTS drift detection (recall.rs).
    pub(crate) fn memory_count(&self, user_id: &str) -> Result<i64> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT COUNT(*) FROM memories WHERE user_id = ?1 AND deleted_at IS NULL",
            params![user_id],
            |r| r.get(0),
        )
        .map_err(MemoryError::from)
    }

    pub(crate) fn fts_count(&self, user_id: &str) -> Result<i64> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT COUNT(*) FROM memories m JOIN memories_fts f ON m.rowid = f.rowid
             WHERE m.user_id = ?1 AND m.deleted_at IS NULL",
            params![user_id],
            |r| r.get(0),
        )
        .map_err(MemoryError::from)
    }

    /// Rebuild the FTS shadow table from scratch — used when drift detection
    /// trips past the small absolute threshold.
    pub(crate) fn rebuild_fts(&self) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute_batch(
            "INSERT INTO memories_fts(memories_fts) VALUES('rebuild');",
        )?;
        Ok(())
    }

    pub fn all_memories_for_vector_sync(&self, user_id: &str) -> Result<Vec<Memory>> {
        let db = self.db.lock().unwrap();
        existing_for_user(&db, user_id)
    }

    /// Bump the per-(user, topic) batch counter and return the new count.
    pub fn bump_topic_seen(&self, user_id: &str, topic: &str) -> Result<u32> {
        let db = self.db.lock().unwrap();
        let now = now_ms();
        db.execute(
            "INSERT INTO topic_stability (user_id, topic, seen_batches, updated_at)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(user_id, topic) DO UPDATE SET
                seen_batches = seen_batches + 1, updated_at = excluded.updated_at",
            params![user_id, topic, now],
        )?;
        db.query_row(
            "SELECT seen_batches FROM topic_stability WHERE user_id = ?1 AND topic = ?2",
            params![user_id, topic],
            |r| r.get(0),
        )
        .map_err(MemoryError::from)
    }
}

fn supersede(
    db: &rusqlite::Connection,
    existing: &Memory,
    new_content: &str,
    thread_id: &str,
    now: i64,
) -> Result<Memory> {
    let mut thread_set = existing.thread_set.clone();
    if !thread_set.contains(&thread_id.to_string()) {
        thread_set.push(thread_id.to_string());
    }
    let thread_set_json = serde_json::to_string(&thread_set)?;
    let repeats = existing.repeats + 1;

    db.execute(
        "UPDATE memories SET content = ?1, thread_set = ?2, repeats = ?3,
         updated_at = ?4, last_seen_ts = ?4 WHERE id = ?5",
        params![new_content, thread_set_json, repeats, now, existing.id],
    )?;
    resync_fts(db, &existing.id, new_content)?;
    debug!(memory_id = %existing.id, repeats, "superseded existing memory");
    get_by_id(db, &existing.id)?.ok_or_else(|| MemoryError::NotFound { id: existing.id.clone() })
}

fn sync_fts_insert(db: &rusqlite::Connection, id: &str, content: &str) -> Result<()> {
    let rowid: i64 = db.query_row("SELECT rowid FROM memories WHERE id = ?1", params![id], |r| r.get(0))?;
    db.execute(
        "INSERT INTO memories_fts(rowid, content) VALUES (?1, ?2)",
        params![rowid, content],
    )?;
    Ok(())
}

fn resync_fts(db: &rusqlite::Connection, id: &str, content: &str) -> Result<()> {
    let rowid: i64 = db.query_row("SELECT rowid FROM memories WHERE id = ?1", params![id], |r| r.get(0))?;
    db.execute(
        "INSERT INTO memories_fts(memories_fts, rowid, content) VALUES ('delete', ?1, ?2)",
        params![rowid, content],
    )
    .ok();
    db.execute(
        "INSERT INTO memories_fts(rowid, content) VALUES (?1, ?2)",
        params![rowid, content],
    )?;
    Ok(())
}

fn delete_fts_row(db: &rusqlite::Connection, id: &str) -> Result<()> {
    let rowid: i64 = db.query_row("SELECT rowid FROM memories WHERE id = ?1", params![id], |r| r.get(0))?;
    db.execute(
        "DELETE FROM memories_fts WHERE rowid = ?1",
        params![rowid],
    )?;
    Ok(())
}

fn existing_for_user(db: &rusqlite::Connection, user_id: &str) -> Result<Vec<Memory>> {
    let mut stmt = db.prepare(
        "SELECT id, user_id, thread_id, content, entities, priority, confidence, tier,
                created_at, updated_at, last_seen_ts, repeats, thread_set, redaction_map, deleted_at
         FROM memories WHERE user_id = ?1 AND deleted_at IS NULL
         ORDER BY updated_at DESC",
    )?;
    let rows = stmt.query_map(params![user_id], row_to_memory)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn get_by_id(db: &rusqlite::Connection, id: &str) -> Result<Option<Memory>> {
    db.query_row(
        "SELECT id, user_id, thread_id, content, entities, priority, confidence, tier,
                created_at, updated_at, last_seen_ts, repeats, thread_set, redaction_map, deleted_at
         FROM memories WHERE id = ?1",
        params![id],
        row_to_memory,
    )
    .optional()
    .map_err(MemoryError::from)
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let tier_str: String = row.get(7)?;
    let entities_raw: String = row.get(4)?;
    let thread_set_raw: String = row.get(12)?;
    let redaction_raw: String = row.get(13)?;
    Ok(Memory {
        id: row.get(0)?,
        user_id: row.get(1)?,
        thread_id: row.get(2)?,
        content: row.get(3)?,
        entities: serde_json::from_str(&entities_raw).unwrap_or_default(),
        priority: row.get(5)?,
        confidence: row.get(6)?,
        tier: tier_str.parse().unwrap_or(Tier::Tier3),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        last_seen_ts: row.get(10)?,
        repeats: row.get(11)?,
        thread_set: serde_json::from_str(&thread_set_raw).unwrap_or_default(),
        redaction_map: serde_json::from_str(&redaction_raw).unwrap_or(serde_json::json!({})),
        deleted_at: row.get(14)?,
    })
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_save_round_trips() {
        let store = MemoryStore::open_in_memory().unwrap();
        let m = store
            .save_explicit("u1", "t1", "my favorite color is blue", None, None)
            .unwrap();
        assert_eq!(m.tier, Tier::Tier1);
        assert_eq!(m.priority, 0.9);
        assert_eq!(m.content, "my favorite color is blue");
    }

    #[test]
    fn superseding_preserves_id_and_bumps_repeats() {
        let store = MemoryStore::open_in_memory().unwrap();
        let first = store
            .save_explicit("u1", "t1", "my favorite color is blue", None, None)
            .unwrap();
        let second = store
            .save_explicit("u1", "t2", "my favorite color is red", None, None)
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.content, "my favorite color is red");
        assert_eq!(second.repeats, 2);
        assert!(second.thread_set.contains(&"t1".to_string()));
        assert!(second.thread_set.contains(&"t2".to_string()));
    }

    #[test]
    fn delete_is_soft_and_cascades_to_fts() {
        let store = MemoryStore::open_in_memory().unwrap();
        let m = store
            .save_explicit("u1", "t1", "my favorite color is blue", None, None)
            .unwrap();
        store.delete(&m.id).unwrap();
        assert!(store.get(&m.id).unwrap().unwrap().deleted_at.is_some());
        let hits = store.fts_search("u1", "favorite", 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn fts_search_finds_phrase_via_keyword_match() {
        let store = MemoryStore::open_in_memory().unwrap();
        store
            .save_explicit("u1", "t1", "my favorite color is blue", None, None)
            .unwrap();
        let hits = store.fts_search("u1", "favorite", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn cadence_state_defaults_when_absent() {
        let store = MemoryStore::open_in_memory().unwrap();
        let state = store.get_cadence_state("t1", "u1").unwrap();
        assert_eq!(state.msg_count, 0);
    }
}
