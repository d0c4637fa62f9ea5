use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{CachedInsight, Store, StoreError, Versioned};
use crate::domain::{EventId, UserDocument, UserId};

#[derive(Default)]
struct MemoryInner {
    documents: HashMap<UserId, Versioned<UserDocument>>,
    processed: HashMap<(UserId, EventId), DateTime<Utc>>,
    insights: HashMap<UserId, CachedInsight>,
}

/// In-process store with the same compare-and-set semantics as SQLite
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Number of users with a document
    pub fn user_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.documents.len())
    }

    /// Drop processed markers applied before `before`
    pub fn prune_processed_before(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut inner = self.lock()?;
        let count = inner.processed.len();
        inner.processed.retain(|_, applied_at| *applied_at >= before);
        Ok(count - inner.processed.len())
    }
}

impl Store for MemoryStore {
    fn load(&self, user_id: &UserId) -> Result<Option<Versioned<UserDocument>>, StoreError> {
        Ok(self.lock()?.documents.get(user_id).cloned())
    }

    fn commit(
        &self,
        user_id: &UserId,
        expected: Option<u64>,
        document: &UserDocument,
        event_id: &EventId,
        applied_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;
        let current = inner.documents.get(user_id).map(|d| d.version);
        if current != expected {
            return Err(StoreError::Conflict {
                user_id: user_id.to_string(),
            });
        }

        let version = expected.unwrap_or(0) + 1;
        inner.documents.insert(
            user_id.clone(),
            Versioned {
                version,
                value: document.clone(),
            },
        );
        inner
            .processed
            .entry((user_id.clone(), event_id.clone()))
            .or_insert(applied_at);
        Ok(version)
    }

    fn is_processed(&self, user_id: &UserId, event_id: &EventId) -> Result<bool, StoreError> {
        Ok(self
            .lock()?
            .processed
            .contains_key(&(user_id.clone(), event_id.clone())))
    }

    fn cached_insight(&self, user_id: &UserId) -> Result<Option<CachedInsight>, StoreError> {
        Ok(self.lock()?.insights.get(user_id).cloned())
    }

    fn cache_insight(&self, user_id: &UserId, cached: &CachedInsight) -> Result<(), StoreError> {
        self.lock()?.insights.insert(user_id.clone(), cached.clone());
        Ok(())
    }
}
