//! Content-addressed evaluation cache.
//!
//! Maps (engine fingerprint, exact position) to a completed evaluation, with
//! an in-memory mirror over a durable key-value store. The store is
//! constructor-injected and the cache has an explicit lifecycle
//! (`init`/`get`/`set`/`clear`); nothing here is a process-wide global.
//! Durable-store failures never surface to callers: the memory path is the
//! one that must work. No eviction — unbounded growth is an accepted
//! limitation of this deployment.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::error::ReviewError;

/// Key prefix shared by all evaluation entries in the store.
pub const CACHE_NAMESPACE: &str = "eval:";

/// Durable key-value store contract (spec of the external collaborator).
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ReviewError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), ReviewError>;
    async fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>, ReviewError>;
    async fn delete(&self, key: &str) -> Result<(), ReviewError>;
}

/// One cached evaluation. Written on every completed search; overwritten,
/// never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cp: i32,
    pub depth: u32,
    /// UCI notation.
    pub best_move: String,
    pub pv: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multipv: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

/// Deterministic key. Deliberately exact: no FEN normalization, so two
/// positions differing only in move-counter fields occupy separate entries.
/// See DESIGN.md for the trade-off.
pub fn cache_key(engine_fingerprint: &str, fen: &str) -> String {
    format!("{CACHE_NAMESPACE}{engine_fingerprint}:{fen}")
}

pub struct EvalCache {
    memory: HashMap<String, CacheEntry>,
    store: Arc<dyn KvStore>,
}

impl EvalCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            memory: HashMap::new(),
            store,
        }
    }

    /// One-time namespace scan to prime memory. Malformed entries are
    /// skipped individually; a failing store just leaves the cache cold.
    pub async fn init(&mut self) -> usize {
        let rows = match self.store.scan(CACHE_NAMESPACE).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "cache scan failed, starting cold");
                return 0;
            }
        };
        let mut loaded = 0;
        for (key, value) in rows {
            match serde_json::from_str::<CacheEntry>(&value) {
                Ok(entry) => {
                    self.memory.insert(key, entry);
                    loaded += 1;
                }
                Err(e) => {
                    warn!(key, error = %e, "skipping malformed cache entry");
                }
            }
        }
        loaded
    }

    /// Memory first; on miss, fall back to the durable store and hydrate.
    /// Absence is a valid, silent outcome.
    pub async fn get(&mut self, key: &str) -> Option<CacheEntry> {
        if let Some(hit) = self.memory.get(key) {
            return Some(hit.clone());
        }
        let value = match self.store.get(key).await {
            Ok(v) => v?,
            Err(e) => {
                debug!(key, error = %e, "durable cache read failed");
                return None;
            }
        };
        match serde_json::from_str::<CacheEntry>(&value) {
            Ok(entry) => {
                self.memory.insert(key.to_string(), entry.clone());
                Some(entry)
            }
            Err(e) => {
                warn!(key, error = %e, "malformed cache entry ignored");
                None
            }
        }
    }

    /// Write-through. The memory write always succeeds; a durable-store
    /// failure (quota, connectivity) is logged and swallowed.
    pub async fn set(&mut self, key: &str, entry: CacheEntry) {
        let serialized = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!(key, error = %e, "cache entry did not serialize");
                self.memory.insert(key.to_string(), entry);
                return;
            }
        };
        self.memory.insert(key.to_string(), entry);
        if let Err(e) = self.store.set(key, &serialized).await {
            warn!(key, error = %e, "durable cache write failed, memory entry kept");
        }
    }

    /// Drop the in-memory mirror. The durable store is untouched.
    pub fn clear(&mut self) {
        self.memory.clear();
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }
}

/// In-memory store used by tests and engine-less runs.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ReviewError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ReviewError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>, ReviewError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), ReviewError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Postgres-backed store. Relies on per-key atomicity of the upsert; no
/// cross-key transactions are needed by the cache.
pub struct PgKvStore {
    pool: PgPool,
}

impl PgKvStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KvStore for PgKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ReviewError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ReviewError> {
        sqlx::query(
            "INSERT INTO kv_store (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>, ReviewError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM kv_store WHERE key LIKE $1 || '%'")
                .bind(prefix)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn delete(&self, key: &str) -> Result<(), ReviewError> {
        sqlx::query("DELETE FROM kv_store WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
