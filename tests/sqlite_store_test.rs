//! Integration tests for the SQLite progression store

mod common;

use std::sync::Arc;

use tempfile::TempDir;

use common::{engine, engine_with};
use emerge::clock::ManualClock;
use emerge::config::{InsightSettings, ProgressionSettings};
use emerge::progression::{ApplyStatus, InsightService};
use emerge::store::{SqliteStore, Store};
use emerge::{Activity, ActivityEvent, Attribute, Difficulty, UserId};

#[test]
fn test_progress_survives_reopen() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("nested").join("progression.db");
    let user = UserId::from("u1");

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let engine = engine(store);
        engine
            .apply(
                &user,
                &ActivityEvent::habit_completion(
                    "e1",
                    "u1",
                    Some(Difficulty::Hard),
                    Some(Attribute::Creativity),
                )
                .with_streak_day(7),
            )
            .unwrap();
        engine
            .apply(&user, &ActivityEvent::new("e2", "u1", Activity::JoinedTribe))
            .unwrap();
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let document = store.load(&user).unwrap().unwrap();
    assert_eq!(document.version, 2);

    let record = &document.value.progression;
    assert_eq!(record.total_xp, 83);
    assert_eq!(record.attribute_xp(Attribute::Creativity), 33);
    assert_eq!(record.streak, 7);
    assert_eq!(record.recent_event_ids.len(), 2);
    assert!(record.updated_at.is_some());

    let studio = document.value.world.zone("studio").unwrap();
    assert_eq!(studio.milestone, 1);
    assert_eq!(store.user_count().unwrap(), 1);

    // Redelivery after restart is still recognized
    let outcome = engine(store.clone())
        .apply(&user, &ActivityEvent::new("e2", "u1", Activity::JoinedTribe))
        .unwrap();
    assert_eq!(outcome.status, ApplyStatus::Duplicate);
    assert_eq!(outcome.record.total_xp, 83);
}

#[test]
fn test_processed_marker_outlives_recent_log() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let settings = ProgressionSettings {
        recent_event_capacity: 2,
        ..ProgressionSettings::default()
    };
    let engine = engine_with(store.clone(), settings);
    let user = UserId::from("u1");

    for id in ["e1", "e2", "e3"] {
        engine
            .apply(&user, &ActivityEvent::new(id, "u1", Activity::ReflectionSaved))
            .unwrap();
    }

    let record = store.load(&user).unwrap().unwrap().value.progression;
    assert!(!record.recent_event_ids.contains(&"e1".into()));
    assert_eq!(record.total_xp, 45);

    let outcome = engine
        .apply(&user, &ActivityEvent::new("e1", "u1", Activity::ReflectionSaved))
        .unwrap();
    assert_eq!(outcome.status, ApplyStatus::Duplicate);
    assert_eq!(store.load(&user).unwrap().unwrap().value.progression.total_xp, 45);
}

#[test]
fn test_insight_cache_is_shared_across_handles() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("progression.db");
    let user = UserId::from("u1");
    let clock = Arc::new(ManualClock::new(common::start_time()));

    let first = {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        InsightService::new(store, clock.clone(), &InsightSettings::default())
            .get_insight(&user)
            .unwrap()
    };
    assert!(first.text.starts_with("Start your journey"));

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    engine(store.clone())
        .apply(
            &user,
            &ActivityEvent::new("e1", "u1", Activity::JoinedTribe).with_streak_day(3),
        )
        .unwrap();

    let service = InsightService::new(store, clock.clone(), &InsightSettings::default());
    assert_eq!(service.get_insight(&user).unwrap(), first);

    clock.advance(chrono::Duration::minutes(16));
    let refreshed = service.get_insight(&user).unwrap();
    assert_eq!(refreshed.streak, 3);
    assert_eq!(refreshed.text, "3 days strong! Keep building momentum.");
}

#[test]
fn test_processed_markers_stamped_by_engine_clock() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let user = UserId::from("u1");
    engine(store.clone())
        .apply(&user, &ActivityEvent::new("e1", "u1", Activity::JoinedTribe))
        .unwrap();

    let applied_at = common::start_time();
    assert_eq!(store.prune_processed_before(applied_at).unwrap(), 0);
    assert!(store.is_processed(&user, &"e1".into()).unwrap());

    let removed = store
        .prune_processed_before(applied_at + chrono::Duration::seconds(1))
        .unwrap();
    assert_eq!(removed, 1);
    assert!(!store.is_processed(&user, &"e1".into()).unwrap());
}
