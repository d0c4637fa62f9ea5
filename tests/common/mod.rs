//! Shared test utilities for progression integration tests
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread::ThreadId;

use chrono::{DateTime, Utc};

use emerge::clock::ManualClock;
use emerge::config::{ProgressionSettings, RetrySettings};
use emerge::progression::ProgressionEngine;
use emerge::store::{CachedInsight, MemoryStore, Store, StoreError, Versioned};
use emerge::{EventId, UserDocument, UserId};

pub fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp")
}

pub fn fast_retry(max_attempts: u32) -> RetrySettings {
    RetrySettings {
        max_attempts,
        base_delay_ms: 1,
        max_delay_ms: 2,
    }
}

/// Engine with default rules, a fixed clock and quick retries
pub fn engine_with(store: Arc<dyn Store>, settings: ProgressionSettings) -> ProgressionEngine {
    ProgressionEngine::new(
        store,
        Arc::new(ManualClock::new(start_time())),
        settings,
        fast_retry(20),
    )
}

pub fn engine(store: Arc<dyn Store>) -> ProgressionEngine {
    engine_with(store, ProgressionSettings::default())
}

/// Store that holds each of the first `parties` threads at its first load
/// until all of them have loaded, so they start from the same version.
/// Later threads pass straight through.
pub struct InterleavingStore {
    inner: MemoryStore,
    parties: usize,
    barrier: Barrier,
    seen: Mutex<HashSet<ThreadId>>,
    pub conflicts: AtomicUsize,
}

impl InterleavingStore {
    pub fn new(parties: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            parties,
            barrier: Barrier::new(parties),
            seen: Mutex::new(HashSet::new()),
            conflicts: AtomicUsize::new(0),
        }
    }
}

impl Store for InterleavingStore {
    fn load(&self, user_id: &UserId) -> Result<Option<Versioned<UserDocument>>, StoreError> {
        let loaded = self.inner.load(user_id)?;
        let gated = {
            let mut seen = self.seen.lock().expect("seen lock");
            seen.insert(std::thread::current().id()) && seen.len() <= self.parties
        };
        if gated {
            self.barrier.wait();
        }
        Ok(loaded)
    }

    fn commit(
        &self,
        user_id: &UserId,
        expected: Option<u64>,
        document: &UserDocument,
        event_id: &EventId,
        applied_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = self.inner.commit(user_id, expected, document, event_id, applied_at);
        if matches!(result, Err(StoreError::Conflict { .. })) {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    fn is_processed(&self, user_id: &UserId, event_id: &EventId) -> Result<bool, StoreError> {
        self.inner.is_processed(user_id, event_id)
    }

    fn cached_insight(&self, user_id: &UserId) -> Result<Option<CachedInsight>, StoreError> {
        self.inner.cached_insight(user_id)
    }

    fn cache_insight(&self, user_id: &UserId, cached: &CachedInsight) -> Result<(), StoreError> {
        self.inner.cache_insight(user_id, cached)
    }
}

/// Store whose first `failures` commits fail with a non-conflict error
pub struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures: AtomicUsize::new(failures),
        }
    }
}

impl Store for FlakyStore {
    fn load(&self, user_id: &UserId) -> Result<Option<Versioned<UserDocument>>, StoreError> {
        self.inner.load(user_id)
    }

    fn commit(
        &self,
        user_id: &UserId,
        expected: Option<u64>,
        document: &UserDocument,
        event_id: &EventId,
        applied_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Poisoned);
        }
        self.inner.commit(user_id, expected, document, event_id, applied_at)
    }

    fn is_processed(&self, user_id: &UserId, event_id: &EventId) -> Result<bool, StoreError> {
        self.inner.is_processed(user_id, event_id)
    }

    fn cached_insight(&self, user_id: &UserId) -> Result<Option<CachedInsight>, StoreError> {
        self.inner.cached_insight(user_id)
    }

    fn cache_insight(&self, user_id: &UserId, cached: &CachedInsight) -> Result<(), StoreError> {
        self.inner.cache_insight(user_id, cached)
    }
}
