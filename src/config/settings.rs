//! Settings configuration types

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::DEFAULT_RECENT_EVENT_CAPACITY;

/// XP values and multipliers
///
/// Multipliers are integer percentages so the arithmetic stays exact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpTable {
    #[serde(default = "default_habit_completion_xp")]
    pub habit_completion: u32,
    #[serde(default = "default_joined_challenge_xp")]
    pub joined_challenge: u32,
    #[serde(default = "default_joined_tribe_xp")]
    pub joined_tribe: u32,
    #[serde(default = "default_reflection_saved_xp")]
    pub reflection_saved: u32,

    #[serde(default = "default_easy_percent")]
    pub easy_percent: u32,
    #[serde(default = "default_medium_percent")]
    pub medium_percent: u32,
    #[serde(default = "default_hard_percent")]
    pub hard_percent: u32,

    /// Streak days per bonus step
    #[serde(default = "default_streak_step_days")]
    pub streak_step_days: u32,
    #[serde(default = "default_streak_bonus_percent_per_step")]
    pub streak_bonus_percent_per_step: u32,
    #[serde(default = "default_max_streak_bonus_percent")]
    pub max_streak_bonus_percent: u32,
}

fn default_habit_completion_xp() -> u32 {
    10
}

fn default_joined_challenge_xp() -> u32 {
    25
}

fn default_joined_tribe_xp() -> u32 {
    50
}

fn default_reflection_saved_xp() -> u32 {
    15
}

fn default_easy_percent() -> u32 {
    100
}

fn default_medium_percent() -> u32 {
    200
}

fn default_hard_percent() -> u32 {
    300
}

fn default_streak_step_days() -> u32 {
    7
}

fn default_streak_bonus_percent_per_step() -> u32 {
    10
}

fn default_max_streak_bonus_percent() -> u32 {
    50
}

impl Default for XpTable {
    fn default() -> Self {
        Self {
            habit_completion: default_habit_completion_xp(),
            joined_challenge: default_joined_challenge_xp(),
            joined_tribe: default_joined_tribe_xp(),
            reflection_saved: default_reflection_saved_xp(),
            easy_percent: default_easy_percent(),
            medium_percent: default_medium_percent(),
            hard_percent: default_hard_percent(),
            streak_step_days: default_streak_step_days(),
            streak_bonus_percent_per_step: default_streak_bonus_percent_per_step(),
            max_streak_bonus_percent: default_max_streak_bonus_percent(),
        }
    }
}

/// Progression rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionSettings {
    #[serde(default)]
    pub xp: XpTable,

    /// XP per level: level = total_xp / xp_per_level + 1
    #[serde(default = "default_xp_per_level")]
    pub xp_per_level: u64,

    /// How many applied event ids each record remembers
    #[serde(default = "default_recent_event_capacity")]
    pub recent_event_capacity: usize,
}

fn default_xp_per_level() -> u64 {
    100
}

fn default_recent_event_capacity() -> usize {
    DEFAULT_RECENT_EVENT_CAPACITY
}

impl Default for ProgressionSettings {
    fn default() -> Self {
        Self {
            xp: XpTable::default(),
            xp_per_level: default_xp_per_level(),
            recent_event_capacity: default_recent_event_capacity(),
        }
    }
}

/// Retry policy for conflicting store transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    10
}

fn default_max_delay_ms() -> u64 {
    250
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySettings {
    /// Backoff before retry number `attempt` (1-based): base, 2x base, 4x base, ... capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

/// Longest accepted insight cache lifetime (one year)
pub const MAX_INSIGHT_TTL_MINUTES: i64 = 60 * 24 * 365;

/// Insight query settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightSettings {
    /// Cache lifetime, 1..=MAX_INSIGHT_TTL_MINUTES
    #[serde(default = "default_insight_ttl_minutes")]
    pub ttl_minutes: i64,
}

impl InsightSettings {
    /// Cache lifetime, clamped into the accepted range
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.ttl_minutes.clamp(1, MAX_INSIGHT_TTL_MINUTES))
    }
}

fn default_insight_ttl_minutes() -> i64 {
    15
}

impl Default for InsightSettings {
    fn default() -> Self {
        Self {
            ttl_minutes: default_insight_ttl_minutes(),
        }
    }
}

/// Dispatcher settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Maximum events applied at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Redeliveries of an event after a retryable failure
    #[serde(default = "default_max_redeliveries")]
    pub max_redeliveries: u32,

    /// Pause before each redelivery
    #[serde(default = "default_redelivery_delay_ms")]
    pub redelivery_delay_ms: u64,

    /// Append progression events as JSON lines to this file
    #[serde(default)]
    pub outbox: Option<PathBuf>,
}

fn default_concurrency() -> usize {
    8
}

fn default_max_redeliveries() -> u32 {
    3
}

fn default_redelivery_delay_ms() -> u64 {
    100
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_redeliveries: default_max_redeliveries(),
            redelivery_delay_ms: default_redelivery_delay_ms(),
            outbox: None,
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// SQLite database path (defaults to ~/.emerge/progression.db)
    #[serde(default)]
    pub path: Option<PathBuf>,
}
