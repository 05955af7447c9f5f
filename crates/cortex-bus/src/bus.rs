use std::sync::Mutex;

use rusqlite::{params, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

use crate::db;
use crate::error::{BusError, Result};

/// Shared.Bus: a SQLite-file-backed key/value store with per-entry TTL.
///
/// Both services talk to their own `Bus` handle over the same `bus.db` file.
/// It is deliberately a reconstructible hint layer, not a system of record —
/// every key it holds (capsules, profile cache, rate counters, the recall
/// query cache) can be recomputed or simply dropped on a miss. A single
/// `Mutex<Connection>` is sufficient at the single-node target this system
/// ships for.
pub struct SqliteBus {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteBus {
    pub fn open(path: &str) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        db::init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        db::init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Raw string get. Returns `None` on miss or expiry; an expired row found
    /// on read is opportunistically deleted.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let now = now_unix();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT value, expires_at FROM bus_entries WHERE key = ?1",
                params![key],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        match row {
            Some((value, expires_at)) if expires_at > now => Ok(Some(value)),
            Some(_) => {
                conn.execute("DELETE FROM bus_entries WHERE key = ?1", params![key])?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Raw string set with a TTL in seconds. Overwriting a key with the same
    /// value is a no-op in effect — republishing a capsule under the same
    /// batch id does not change observable state.
    pub fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let expires_at = now_unix() + ttl_secs as i64;
        conn.execute(
            "INSERT INTO bus_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value, expires_at],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM bus_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Typed get via JSON.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).map_err(BusError::from)?)),
            None => Ok(None),
        }
    }

    /// Typed set via JSON.
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        let raw = serde_json::to_string(value).map_err(BusError::from)?;
        self.set(key, &raw, ttl_secs)
    }

    /// Atomic increment of a TTL'd counter, used for per-user rate limiting
    /// (`ratelimit:{userId}:{op}`). The TTL resets on every call
    /// that creates the row but not on updates, giving a fixed window.
    pub fn incr(&self, key: &str, ttl_secs: u64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let now = now_unix();
        let existing: Option<(i64, i64)> = conn
            .query_row(
                "SELECT value, expires_at FROM bus_entries WHERE key = ?1",
                params![key],
                |r| {
                    let raw: String = r.get(0)?;
                    let expires_at: i64 = r.get(1)?;
                    Ok((raw.parse::<i64>().unwrap_or(0), expires_at))
                },
            )
            .optional()?;

        let next = match existing {
            Some((count, expires_at)) if expires_at > now => count + 1,
            _ => 1,
        };
        let expires_at = match existing {
            Some((_, expires_at)) if expires_at > now => expires_at,
            _ => now + ttl_secs as i64,
        };

        conn.execute(
            "INSERT INTO bus_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, next.to_string(), expires_at],
        )?;
        Ok(next)
    }

    /// Sweep expired rows. Not required for correctness (reads self-clean)
    /// but keeps the file from growing unbounded under steady load.
    pub fn sweep_expired(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let now = now_unix();
        let n = conn.execute("DELETE FROM bus_entries WHERE expires_at <= ?1", params![now])?;
        Ok(n)
    }
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Cache-bus key helpers.
pub mod keys {
    pub fn capsule(thread_id: &str, batch_id: &str) -> String {
        format!("capsule:{}:{}", thread_id, batch_id)
    }

    /// Pointer to the most recently published batch id for a thread. The
    /// gateway's early-window poller doesn't know a research job's batch id
    /// in advance (the job is enqueued asynchronously, turns earlier) — it
    /// resolves this pointer first, then reads `capsule(thread_id, batch_id)`.
    pub fn capsule_latest(thread_id: &str) -> String {
        format!("capsule_latest:{}", thread_id)
    }

    pub fn profile(user_id: &str) -> String {
        format!("profile:{}", user_id)
    }

    pub fn research_cache(
        topic_hash: &str,
        ttl_class: &str,
        recency_hint: &str,
        query_hash: &str,
    ) -> String {
        format!("CAPS:v2:{}:{}:{}:{}", topic_hash, ttl_class, recency_hint, query_hash)
    }

    pub fn rate_limit(user_id: &str, op: &str) -> String {
        format!("ratelimit:{}:{}", user_id, op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let bus = SqliteBus::open_in_memory().unwrap();
        bus.set("k1", "hello", 60).unwrap();
        assert_eq!(bus.get("k1").unwrap(), Some("hello".to_string()));
    }

    #[test]
    fn get_on_expired_key_returns_none() {
        let bus = SqliteBus::open_in_memory().unwrap();
        bus.set("k1", "hello", 0).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert_eq!(bus.get("k1").unwrap(), None);
    }

    #[test]
    fn republishing_same_value_is_a_no_op() {
        let bus = SqliteBus::open_in_memory().unwrap();
        let key = keys::capsule("t1", "b1");
        bus.set(&key, "payload", 60).unwrap();
        bus.set(&key, "payload", 60).unwrap();
        assert_eq!(bus.get(&key).unwrap(), Some("payload".to_string()));
    }

    #[test]
    fn incr_counts_within_window() {
        let bus = SqliteBus::open_in_memory().unwrap();
        let key = keys::rate_limit("u1", "chat");
        assert_eq!(bus.incr(&key, 60).unwrap(), 1);
        assert_eq!(bus.incr(&key, 60).unwrap(), 2);
        assert_eq!(bus.incr(&key, 60).unwrap(), 3);
    }

    #[test]
    fn json_round_trip() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Capsule {
            claims: Vec<String>,
        }
        let bus = SqliteBus::open_in_memory().unwrap();
        let capsule = Capsule {
            claims: vec!["a".into(), "b".into()],
        };
        bus.set_json("capsule:t1:b1", &capsule, 60).unwrap();
        let back: Option<Capsule> = bus.get_json("capsule:t1:b1").unwrap();
        assert_eq!(back, Some(capsule));
    }

    #[test]
    fn delete_removes_key() {
        let bus = SqliteBus::open_in_memory().unwrap();
        bus.set("k1", "v", 60).unwrap();
        bus.delete("k1").unwrap();
        assert_eq!(bus.get("k1").unwrap(), None);
    }
}
