//! SQLite-backed progression store
//!
//! Manages `~/.emerge/progression.db` with automatic schema migration.
//! Scalars live in columns; attribute buckets, the recent event log and the
//! world state are JSON columns read and written as a whole.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior};

use super::{CachedInsight, Store, StoreError, Versioned};
use crate::domain::{EventId, ProgressionRecord, UserDocument, UserId};
use crate::progression::Insight;

/// How long a writer waits on a locked database before reporting a conflict
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

fn to_millis(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(|t| t.timestamp_millis())
}

fn from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::from_timestamp_millis)
}

/// Busy/locked databases are contention, not failure
fn classify(err: rusqlite::Error, user_id: &UserId) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => StoreError::Conflict {
            user_id: user_id.to_string(),
        },
        _ => StoreError::Sqlite(err),
    }
}

/// Database wrapper around a shared connection
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at a specific path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;

        // WAL lets several processes read while one writes
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        Self::from_connection(conn)
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA_SQL)?;
        drop(conn);
        self.run_migrations()
    }

    /// Run any pending migrations
    fn run_migrations(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;

        let version: i32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))
            .unwrap_or(0);

        // Migration 2: index processed markers by age for pruning
        if version < 2 {
            conn.execute_batch(
                r#"
                CREATE INDEX IF NOT EXISTS idx_processed_applied_at ON processed_events(applied_at);
                INSERT OR REPLACE INTO schema_version VALUES (2);
                "#,
            )?;
        }

        Ok(())
    }

    /// Drop processed markers older than `before`. Records keep their own
    /// bounded log, so only very late redeliveries lose protection.
    pub fn prune_processed_before(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM processed_events WHERE applied_at < ?1",
            [before.timestamp_millis()],
        )?;
        Ok(removed)
    }

    /// Number of users with a progression row
    pub fn user_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM user_progress", [], |r| r.get(0))?;
        Ok(count)
    }
}

impl Store for SqliteStore {
    fn load(&self, user_id: &UserId) -> Result<Option<Versioned<UserDocument>>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"SELECT version, total_xp, level, streak, attribute_xp, recent_event_ids,
                          world_state, updated_at
                   FROM user_progress WHERE user_id = ?1"#,
                [user_id.as_str()],
                |r| {
                    Ok((
                        r.get::<_, u64>(0)?,
                        r.get::<_, u64>(1)?,
                        r.get::<_, u32>(2)?,
                        r.get::<_, u32>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, String>(5)?,
                        r.get::<_, String>(6)?,
                        r.get::<_, Option<i64>>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((version, total_xp, level, streak, attribute_xp, recent, world, updated_at)) = row
        else {
            return Ok(None);
        };

        let document = UserDocument {
            progression: ProgressionRecord {
                total_xp,
                attribute_xp: serde_json::from_str(&attribute_xp)?,
                level,
                streak,
                recent_event_ids: serde_json::from_str(&recent)?,
                updated_at: from_millis(updated_at),
            },
            world: serde_json::from_str(&world)?,
        };

        Ok(Some(Versioned {
            version,
            value: document,
        }))
    }

    fn commit(
        &self,
        user_id: &UserId,
        expected: Option<u64>,
        document: &UserDocument,
        event_id: &EventId,
        applied_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let record = &document.progression;
        let attribute_xp = serde_json::to_string(&record.attribute_xp)?;
        let recent = serde_json::to_string(&record.recent_event_ids)?;
        let world = serde_json::to_string(&document.world)?;

        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| classify(e, user_id))?;

        let current: Option<u64> = tx
            .query_row(
                "SELECT version FROM user_progress WHERE user_id = ?1",
                [user_id.as_str()],
                |r| r.get(0),
            )
            .optional()?;
        if current != expected {
            // Dropping the transaction rolls it back
            return Err(StoreError::Conflict {
                user_id: user_id.to_string(),
            });
        }

        let version = expected.unwrap_or(0) + 1;
        tx.execute(
            r#"INSERT INTO user_progress
                   (user_id, version, total_xp, level, streak, attribute_xp, recent_event_ids,
                    world_state, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
               ON CONFLICT(user_id) DO UPDATE SET
                   version = ?2, total_xp = ?3, level = ?4, streak = ?5, attribute_xp = ?6,
                   recent_event_ids = ?7, world_state = ?8, updated_at = ?9"#,
            rusqlite::params![
                user_id.as_str(),
                version,
                record.total_xp,
                record.level,
                record.streak,
                attribute_xp,
                recent,
                world,
                to_millis(record.updated_at),
            ],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO processed_events (user_id, event_id, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![user_id.as_str(), event_id.as_str(), applied_at.timestamp_millis()],
        )?;
        tx.commit().map_err(|e| classify(e, user_id))?;

        Ok(version)
    }

    fn is_processed(&self, user_id: &UserId, event_id: &EventId) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM processed_events WHERE user_id = ?1 AND event_id = ?2",
                [user_id.as_str(), event_id.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn cached_insight(&self, user_id: &UserId) -> Result<Option<CachedInsight>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT insight, level, streak, cached_at FROM insight_cache WHERE user_id = ?1",
                [user_id.as_str()],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, u32>(1)?,
                        r.get::<_, u32>(2)?,
                        r.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.and_then(|(text, level, streak, cached_at)| {
            DateTime::from_timestamp_millis(cached_at).map(|cached_at| CachedInsight {
                insight: Insight {
                    text,
                    level,
                    streak,
                },
                cached_at,
            })
        }))
    }

    fn cache_insight(&self, user_id: &UserId, cached: &CachedInsight) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT INTO insight_cache (user_id, insight, level, streak, cached_at)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(user_id) DO UPDATE SET
                   insight = ?2, level = ?3, streak = ?4, cached_at = ?5"#,
            rusqlite::params![
                user_id.as_str(),
                cached.insight.text,
                cached.insight.level,
                cached.insight.streak,
                cached.cached_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }
}

/// SQL schema for the progression database
const SCHEMA_SQL: &str = r#"
-- One row per user: progression record + world state
CREATE TABLE IF NOT EXISTS user_progress (
    user_id TEXT PRIMARY KEY,
    version INTEGER NOT NULL,
    total_xp INTEGER NOT NULL DEFAULT 0,
    level INTEGER NOT NULL DEFAULT 1,
    streak INTEGER NOT NULL DEFAULT 0,
    attribute_xp TEXT NOT NULL DEFAULT '{}',
    recent_event_ids TEXT NOT NULL DEFAULT '[]',
    world_state TEXT NOT NULL DEFAULT '{}',
    updated_at INTEGER
);

-- Durable idempotency markers
CREATE TABLE IF NOT EXISTS processed_events (
    user_id TEXT NOT NULL,
    event_id TEXT NOT NULL,
    applied_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, event_id)
);

-- Insight cache (TTL enforced by the reader)
CREATE TABLE IF NOT EXISTS insight_cache (
    user_id TEXT PRIMARY KEY,
    insight TEXT NOT NULL,
    level INTEGER NOT NULL,
    streak INTEGER NOT NULL,
    cached_at INTEGER NOT NULL
);

-- Schema version
CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);
INSERT OR IGNORE INTO schema_version VALUES (1);
"#;
