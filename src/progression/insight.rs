//! Insight query: a short motivational line derived from level and streak
//!
//! Answers are cached per user for a fixed TTL. Applying new activity does
//! not invalidate the cache, so a user may see a stale insight for up to
//! one TTL after leveling up.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::InsightSettings;
use crate::domain::{ProgressionRecord, UserId};
use crate::store::{CachedInsight, Store, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub text: String,
    pub level: u32,
    pub streak: u32,
}

/// Pick the message tier for a record (`None` = user has no progress yet)
pub fn derive_insight(record: Option<&ProgressionRecord>) -> Insight {
    let Some(record) = record else {
        return Insight {
            text: "Start your journey by completing your first habit!".to_string(),
            level: 1,
            streak: 0,
        };
    };

    let (level, streak) = (record.level.max(1), record.streak);
    let text = if streak >= 7 {
        format!("Amazing! Your {}-day streak shows real commitment.", streak)
    } else if streak >= 3 {
        format!("{} days strong! Keep building momentum.", streak)
    } else if level > 1 {
        format!("Level {} achieved! Progress over perfection.", level)
    } else {
        "Every expert was once a beginner. Start with one habit.".to_string()
    };

    Insight {
        text,
        level,
        streak,
    }
}

/// Read-side entry point for insights
pub struct InsightService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl InsightService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, settings: &InsightSettings) -> Self {
        Self {
            store,
            clock,
            ttl: settings.ttl(),
        }
    }

    pub fn get_insight(&self, user_id: &UserId) -> Result<Insight, StoreError> {
        let now = self.clock.now();

        if let Some(cached) = self.store.cached_insight(user_id)? {
            if now - cached.cached_at < self.ttl {
                debug!("Insight cache hit for {}", user_id);
                return Ok(cached.insight);
            }
        }

        let document = self.store.load(user_id)?;
        let insight = derive_insight(document.as_ref().map(|d| &d.value.progression));

        let cached = CachedInsight {
            insight: insight.clone(),
            cached_at: now,
        };
        if let Err(e) = self.store.cache_insight(user_id, &cached) {
            warn!("Failed to cache insight for {}: {}", user_id, e);
        }

        Ok(insight)
    }
}
