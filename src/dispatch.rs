//! Dispatcher: drives the synchronous engine from async code
//!
//! Each delivery is applied on the blocking pool, bounded by a semaphore.
//! Retryable failures are redelivered a bounded number of times, which is
//! safe because apply is idempotent per event id. Malformed deliveries are
//! dropped. Outbox events go to the sink after each successful apply.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::DispatchSettings;
use crate::domain::{ActivityEvent, UserId};
use crate::notify::{NotificationSink, deliver_all};
use crate::progression::{ApplyOutcome, ApplyStatus, LevelUp, ProgressionEngine};

/// An event addressed to a user's progression
#[derive(Debug, Clone)]
pub struct Delivery {
    pub user_id: UserId,
    pub event: ActivityEvent,
}

impl Delivery {
    pub fn new(user_id: impl Into<UserId>, event: ActivityEvent) -> Self {
        Self {
            user_id: user_id.into(),
            event,
        }
    }
}

impl From<ActivityEvent> for Delivery {
    /// Route an event to the user it names
    fn from(event: ActivityEvent) -> Self {
        Self {
            user_id: event.user_id.clone(),
            event,
        }
    }
}

/// Tally of one dispatch run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub applied: usize,
    pub duplicates: usize,
    /// Unrecognized activity types
    pub ignored: usize,
    /// Malformed; not retried
    pub dropped: usize,
    /// Still failing after all redeliveries
    pub failed: usize,
    pub redeliveries: usize,
    pub notifications: usize,
    pub level_ups: Vec<LevelUp>,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.applied + self.duplicates + self.ignored + self.dropped + self.failed
    }

    fn record(&mut self, result: DeliveryResult) {
        self.redeliveries += result.redeliveries;
        self.notifications += result.notifications;
        match result.disposition {
            Disposition::Done(outcome) => {
                match outcome.status {
                    ApplyStatus::Applied => self.applied += 1,
                    ApplyStatus::Duplicate => self.duplicates += 1,
                    ApplyStatus::Ignored => self.ignored += 1,
                }
                if let Some(level_up) = outcome.level_up() {
                    self.level_ups.push(level_up.clone());
                }
            }
            Disposition::Dropped => self.dropped += 1,
            Disposition::Failed => self.failed += 1,
        }
    }
}

enum Disposition {
    Done(Box<ApplyOutcome>),
    Dropped,
    Failed,
}

struct DeliveryResult {
    disposition: Disposition,
    redeliveries: usize,
    notifications: usize,
}

/// Applies deliveries concurrently and forwards their outboxes
pub struct Dispatcher {
    engine: Arc<ProgressionEngine>,
    sink: Arc<dyn NotificationSink>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<ProgressionEngine>,
        sink: Arc<dyn NotificationSink>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            engine,
            sink,
            settings,
        }
    }

    /// Process every delivery and report what happened
    pub async fn run<I>(&self, deliveries: I) -> DispatchReport
    where
        I: IntoIterator,
        I::Item: Into<Delivery>,
    {
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));

        let tasks = deliveries.into_iter().map(|delivery| {
            let semaphore = semaphore.clone();
            let delivery = delivery.into();
            async move {
                // The semaphore is never closed, so acquire cannot fail
                let _permit = semaphore.acquire_owned().await.ok();
                self.process(delivery).await
            }
        });
        let results = futures::future::join_all(tasks).await;

        let mut report = DispatchReport::default();
        for result in results {
            report.record(result);
        }

        info!(
            "Dispatched {} events: {} applied, {} duplicate, {} ignored, {} dropped, {} failed",
            report.total(),
            report.applied,
            report.duplicates,
            report.ignored,
            report.dropped,
            report.failed
        );
        report
    }

    async fn process(&self, delivery: Delivery) -> DeliveryResult {
        let mut redeliveries = 0;
        let delivery = Arc::new(delivery);

        loop {
            let engine = self.engine.clone();
            let task = delivery.clone();
            let result =
                tokio::task::spawn_blocking(move || engine.apply(&task.user_id, &task.event)).await;

            match result {
                Ok(Ok(outcome)) => {
                    let notifications = deliver_all(self.sink.as_ref(), &outcome.events).await;
                    return DeliveryResult {
                        disposition: Disposition::Done(Box::new(outcome)),
                        redeliveries,
                        notifications,
                    };
                }
                Ok(Err(e)) if !e.is_retryable() => {
                    warn!("Dropping event {}: {}", delivery.event.event_id, e);
                    return DeliveryResult {
                        disposition: Disposition::Dropped,
                        redeliveries,
                        notifications: 0,
                    };
                }
                Ok(Err(e)) if (redeliveries as u32) < self.settings.max_redeliveries => {
                    redeliveries += 1;
                    debug!(
                        "Redelivering event {} ({}/{}): {}",
                        delivery.event.event_id, redeliveries, self.settings.max_redeliveries, e
                    );
                    tokio::time::sleep(Duration::from_millis(self.settings.redelivery_delay_ms))
                        .await;
                }
                Ok(Err(e)) => {
                    error!(
                        "Event {} failed after {} redeliveries: {}",
                        delivery.event.event_id, redeliveries, e
                    );
                    return DeliveryResult {
                        disposition: Disposition::Failed,
                        redeliveries,
                        notifications: 0,
                    };
                }
                Err(e) => {
                    error!("Apply task for {} aborted: {}", delivery.event.event_id, e);
                    return DeliveryResult {
                        disposition: Disposition::Failed,
                        redeliveries,
                        notifications: 0,
                    };
                }
            }
        }
    }
}
