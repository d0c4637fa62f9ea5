//! Progression engine - the transactional reducer
//!
//! `apply` folds one activity event into the user's document exactly once:
//! read the current version, skip if the event was already applied, compute
//! the new record and world, and commit only if nobody else wrote in the
//! meantime. Conflicts are retried with exponential backoff a bounded
//! number of times and then surfaced as a retryable error.
//!
//! Domain events are built only after the commit succeeded and are returned
//! to the caller instead of being sent from here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::events::{LevelUp, ProgressionEvent};
use super::levels::level_from_xp;
use super::xp::compute_xp_gain;
use super::zones::{update_zone, zone_for};
use crate::clock::Clock;
use crate::config::{Config, ProgressionSettings, RetrySettings};
use crate::domain::{
    Activity, ActivityEvent, Attribute, MalformedEvent, ProgressionRecord, UserDocument, UserId,
    WorldState, ZoneId,
};
use crate::store::{Store, StoreError};

/// Error type for apply
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// Rejected before touching state; redelivery cannot help
    #[error("Malformed event: {0}")]
    Malformed(#[from] MalformedEvent),

    #[error("Gave up on user {user_id} after {attempts} conflicting attempts")]
    RetryExhausted { user_id: String, attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApplyError {
    /// Whether the dispatcher should redeliver the event
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }
}

/// What happened to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    Applied,
    /// Already applied earlier; nothing written
    Duplicate,
    /// Unrecognized activity type; nothing written
    Ignored,
}

/// Result of a successful apply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyOutcome {
    pub status: ApplyStatus,
    pub gain: u32,
    pub record: ProgressionRecord,
    pub world: WorldState,
    /// Outbox: events for the notification collaborator
    pub events: Vec<ProgressionEvent>,
}

impl ApplyOutcome {
    fn unchanged(status: ApplyStatus, document: UserDocument) -> Self {
        Self {
            status,
            gain: 0,
            record: document.progression,
            world: document.world,
            events: Vec::new(),
        }
    }

    pub fn level_up(&self) -> Option<&LevelUp> {
        self.events.iter().find_map(|e| match e {
            ProgressionEvent::LevelUp(level_up) => Some(level_up),
            _ => None,
        })
    }
}

/// Attribute whose zone an event feeds; only habit completions grow zones
fn zone_attribute(event: &ActivityEvent) -> Option<Attribute> {
    match event.activity {
        Activity::HabitCompletion { .. } => event.attribute,
        _ => None,
    }
}

/// Fold one event into a document. Pure.
pub fn reduce(
    document: &UserDocument,
    event: &ActivityEvent,
    gain: u32,
    settings: &ProgressionSettings,
    now: DateTime<Utc>,
) -> UserDocument {
    let mut next = document.clone();
    let record = &mut next.progression;

    record.total_xp = record.total_xp.saturating_add(u64::from(gain));
    if let Some(attribute) = event.attribute {
        let bucket = record.attribute_xp.entry(attribute).or_insert(0);
        *bucket = bucket.saturating_add(u64::from(gain));
    }
    record.level = level_from_xp(record.total_xp, settings.xp_per_level);
    if let Some(streak_day) = event.streak_day {
        record.streak = streak_day;
    }
    record
        .recent_event_ids
        .push(event.event_id.clone(), settings.recent_event_capacity);
    record.updated_at = Some(now);

    if let Some(attribute) = zone_attribute(event) {
        next.world = update_zone(&next.world, attribute, true, now);
    }

    next
}

/// Events implied by going from `before` to `after`
fn outbox(
    user_id: &UserId,
    event: &ActivityEvent,
    gain: u32,
    before: &UserDocument,
    after: &UserDocument,
) -> Vec<ProgressionEvent> {
    let mut events = Vec::new();
    let (old, new) = (&before.progression, &after.progression);

    if gain > 0 {
        events.push(ProgressionEvent::XpAwarded {
            user_id: user_id.clone(),
            event_id: event.event_id.clone(),
            amount: gain,
            total_xp: new.total_xp,
        });
    }

    if new.level > old.level {
        events.push(ProgressionEvent::LevelUp(LevelUp {
            user_id: user_id.clone(),
            old_level: old.level,
            new_level: new.level,
        }));
    }

    if let Some(attribute) = zone_attribute(event) {
        let zone = ZoneId::from(zone_for(attribute));
        let old_level = before.world.zones.get(&zone).map(|z| z.level).unwrap_or(1);
        if let Some(state) = after.world.zones.get(&zone) {
            if state.level > old_level {
                events.push(ProgressionEvent::ZoneLeveledUp {
                    user_id: user_id.clone(),
                    zone,
                    new_level: state.level,
                });
            }
        }
    }

    if new.streak != old.streak {
        events.push(ProgressionEvent::StreakUpdated {
            user_id: user_id.clone(),
            streak: new.streak,
        });
    }

    events
}

/// Applies activity events to progression records
pub struct ProgressionEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    settings: ProgressionSettings,
    retry: RetrySettings,
}

impl ProgressionEngine {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        settings: ProgressionSettings,
        retry: RetrySettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
            retry,
        }
    }

    pub fn from_config(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self::new(store, clock, config.progression.clone(), config.retry.clone())
    }

    pub fn settings(&self) -> &ProgressionSettings {
        &self.settings
    }

    /// Current document for a user (defaults if none yet)
    pub fn document(&self, user_id: &UserId) -> Result<UserDocument, StoreError> {
        Ok(self
            .store
            .load(user_id)?
            .map(|d| d.value)
            .unwrap_or_default())
    }

    /// Apply one event to `user_id`'s progression, at most once per event id
    pub fn apply(&self, user_id: &UserId, event: &ActivityEvent) -> Result<ApplyOutcome, ApplyError> {
        if event.user_id != *user_id {
            return Err(MalformedEvent::UserMismatch {
                event_id: event.event_id.to_string(),
                event_user: event.user_id.to_string(),
                requested_user: user_id.to_string(),
            }
            .into());
        }

        if !event.activity.is_recognized() {
            debug!(
                "No XP for activity type {} (event {})",
                event.activity.kind(),
                event.event_id
            );
            return Ok(ApplyOutcome::unchanged(
                ApplyStatus::Ignored,
                self.document(user_id)?,
            ));
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_apply(user_id, event) {
                Ok(outcome) => return Ok(outcome),
                Err(StoreError::Conflict { .. }) if attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    debug!(
                        "Conflict applying {} for {} (attempt {}/{}), retrying in {:?}",
                        event.event_id, user_id, attempt, max_attempts, delay
                    );
                    std::thread::sleep(delay);
                }
                Err(StoreError::Conflict { .. }) => {
                    warn!(
                        "Giving up on event {} for {} after {} attempts",
                        event.event_id, user_id, attempt
                    );
                    return Err(ApplyError::RetryExhausted {
                        user_id: user_id.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// One optimistic read-modify-write attempt
    fn try_apply(&self, user_id: &UserId, event: &ActivityEvent) -> Result<ApplyOutcome, StoreError> {
        let (expected, current) = match self.store.load(user_id)? {
            Some(versioned) => (Some(versioned.version), versioned.value),
            None => (None, UserDocument::default()),
        };

        if current.progression.recent_event_ids.contains(&event.event_id)
            || self.store.is_processed(user_id, &event.event_id)?
        {
            debug!("Event {} already applied for {}", event.event_id, user_id);
            return Ok(ApplyOutcome::unchanged(ApplyStatus::Duplicate, current));
        }

        let gain = compute_xp_gain(&self.settings.xp, &event.activity, event.streak_day);
        let now = self.clock.now();
        let next = reduce(&current, event, gain, &self.settings, now);

        self.store.commit(user_id, expected, &next, &event.event_id, now)?;

        let events = outbox(user_id, event, gain, &current, &next);
        let (old, new) = (&current.progression, &next.progression);
        if new.level > old.level {
            info!(
                "User {} leveled up from {} to {}",
                user_id, old.level, new.level
            );
        }
        info!(
            "Applied {} ({}) for {}: +{} XP, {} -> {} XP, level {}",
            event.event_id,
            event.activity.kind(),
            user_id,
            gain,
            old.total_xp,
            new.total_xp,
            new.level
        );

        Ok(ApplyOutcome {
            status: ApplyStatus::Applied,
            gain,
            record: next.progression,
            world: next.world,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{Difficulty, EventId};
    use crate::store::{MemoryStore, Versioned};

    fn engine(store: Arc<dyn Store>) -> ProgressionEngine {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        ProgressionEngine::new(
            store,
            clock,
            ProgressionSettings::default(),
            RetrySettings {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 2,
            },
        )
    }

    #[test]
    fn test_first_event_creates_record() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let user = UserId::from("u1");

        let event = ActivityEvent::habit_completion(
            "e1",
            "u1",
            Some(Difficulty::Medium),
            Some(Attribute::Vitality),
        )
        .with_streak_day(0);
        let outcome = engine.apply(&user, &event).unwrap();

        assert_eq!(outcome.status, ApplyStatus::Applied);
        assert_eq!(outcome.gain, 20);
        assert_eq!(outcome.record.total_xp, 20);
        assert_eq!(outcome.record.level, 1);
        assert_eq!(outcome.record.attribute_xp(Attribute::Vitality), 20);
        assert!(outcome.record.updated_at.is_some());
        assert!(outcome.level_up().is_none());
        assert_eq!(outcome.world.zone("park").unwrap().milestone, 1);
        assert_eq!(store.load(&user).unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_user_mismatch_is_malformed() {
        let engine = engine(Arc::new(MemoryStore::new()));
        let event = ActivityEvent::new("e1", "u1", Activity::JoinedTribe);
        let err = engine.apply(&UserId::from("u2"), &event).unwrap_err();
        assert!(matches!(err, ApplyError::Malformed(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_level_up_emitted_once_threshold_crossed() {
        let engine = engine(Arc::new(MemoryStore::new()));
        let user = UserId::from("u1");

        engine
            .apply(&user, &ActivityEvent::new("e1", "u1", Activity::JoinedTribe))
            .unwrap();
        let outcome = engine
            .apply(&user, &ActivityEvent::new("e2", "u1", Activity::JoinedTribe))
            .unwrap();

        assert_eq!(outcome.record.total_xp, 100);
        assert_eq!(
            outcome.level_up(),
            Some(&LevelUp {
                user_id: user.clone(),
                old_level: 1,
                new_level: 2,
            })
        );
    }

    #[test]
    fn test_non_habit_gain_has_no_attribute_bucket() {
        let engine = engine(Arc::new(MemoryStore::new()));
        let user = UserId::from("u1");
        let outcome = engine
            .apply(&user, &ActivityEvent::new("e1", "u1", Activity::ReflectionSaved))
            .unwrap();
        assert_eq!(outcome.record.total_xp, 15);
        assert!(outcome.record.attribute_xp.is_empty());
        assert!(outcome.world.zones.is_empty());
    }

    #[test]
    fn test_challenge_with_attribute_credits_bucket_not_zone() {
        let engine = engine(Arc::new(MemoryStore::new()));
        let user = UserId::from("u1");
        let event = ActivityEvent::from_json(
            r#"{"eventId":"e1","userId":"u1","type":"joined_challenge","attribute":"strength"}"#,
        )
        .unwrap();

        let outcome = engine.apply(&user, &event).unwrap();
        assert_eq!(outcome.record.total_xp, 25);
        assert_eq!(outcome.record.attribute_xp(Attribute::Strength), 25);
        assert!(outcome.world.zones.is_empty());
        assert!(
            outcome
                .events
                .iter()
                .all(|e| !matches!(e, ProgressionEvent::ZoneLeveledUp { .. }))
        );
    }

    /// Store whose commits always lose the race
    struct AlwaysConflict(MemoryStore);

    impl Store for AlwaysConflict {
        fn load(&self, user_id: &UserId) -> Result<Option<Versioned<UserDocument>>, StoreError> {
            self.0.load(user_id)
        }
        fn commit(
            &self,
            user_id: &UserId,
            _expected: Option<u64>,
            _document: &UserDocument,
            _event_id: &EventId,
            _applied_at: DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            Err(StoreError::Conflict {
                user_id: user_id.to_string(),
            })
        }
        fn is_processed(&self, user_id: &UserId, event_id: &EventId) -> Result<bool, StoreError> {
            self.0.is_processed(user_id, event_id)
        }
        fn cached_insight(
            &self,
            user_id: &UserId,
        ) -> Result<Option<crate::store::CachedInsight>, StoreError> {
            self.0.cached_insight(user_id)
        }
        fn cache_insight(
            &self,
            user_id: &UserId,
            cached: &crate::store::CachedInsight,
        ) -> Result<(), StoreError> {
            self.0.cache_insight(user_id, cached)
        }
    }

    #[test]
    fn test_conflicts_exhaust_into_retryable_error() {
        let engine = engine(Arc::new(AlwaysConflict(MemoryStore::new())));
        let user = UserId::from("u1");
        let err = engine
            .apply(&user, &ActivityEvent::new("e1", "u1", Activity::JoinedChallenge))
            .unwrap_err();

        match &err {
            ApplyError::RetryExhausted { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[test]
    fn test_reduce_sets_streak_only_when_present() {
        let settings = ProgressionSettings::default();
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut doc = UserDocument::default();
        doc.progression.streak = 5;

        let event = ActivityEvent::new("e1", "u1", Activity::JoinedChallenge);
        assert_eq!(reduce(&doc, &event, 25, &settings, now).progression.streak, 5);

        let event = event.with_streak_day(9);
        assert_eq!(reduce(&doc, &event, 25, &settings, now).progression.streak, 9);
    }
}
