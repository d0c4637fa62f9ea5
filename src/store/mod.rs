//! Persistence for progression documents
//!
//! A `Store` offers per-user optimistic transactions: `load` returns the
//! document with its version, `commit` writes a new document only if the
//! version is unchanged and records the event id as processed in the same
//! atomic step. Callers retry on `StoreError::Conflict`.
//!
//! The insight cache lives here too so cached answers survive across
//! invocations, the same way the progression record does.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{EventId, UserDocument, UserId};
use crate::progression::Insight;

/// A value together with the version it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// An insight and when it was computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedInsight {
    pub insight: Insight,
    pub cached_at: DateTime<Utc>,
}

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Someone else committed first; re-read and try again
    #[error("Write conflict on progression of user {user_id}")]
    Conflict { user_id: String },

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to prepare store at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Transactional document store keyed by user
pub trait Store: Send + Sync {
    /// Current document and version, `None` if the user has none yet
    fn load(&self, user_id: &UserId) -> Result<Option<Versioned<UserDocument>>, StoreError>;

    /// Write `document` if the stored version still equals `expected`
    /// (`None` = must not exist yet) and mark `event_id` processed as of
    /// `applied_at`. Returns the new version.
    fn commit(
        &self,
        user_id: &UserId,
        expected: Option<u64>,
        document: &UserDocument,
        event_id: &EventId,
        applied_at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Whether `event_id` was already committed for this user
    fn is_processed(&self, user_id: &UserId, event_id: &EventId) -> Result<bool, StoreError>;

    fn cached_insight(&self, user_id: &UserId) -> Result<Option<CachedInsight>, StoreError>;

    fn cache_insight(&self, user_id: &UserId, cached: &CachedInsight) -> Result<(), StoreError>;
}
