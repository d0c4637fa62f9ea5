//! Domain events produced by a committed apply
//!
//! The engine never talks to notification systems itself; it hands these
//! back to the caller, which forwards them to a `NotificationSink`.

use serde::{Deserialize, Serialize};

use crate::domain::{EventId, UserId, ZoneId};

/// A level up event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    pub user_id: UserId,
    pub old_level: u32,
    pub new_level: u32,
}

/// Events that can happen while applying an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressionEvent {
    XpAwarded {
        user_id: UserId,
        event_id: EventId,
        amount: u32,
        total_xp: u64,
    },
    LevelUp(LevelUp),
    ZoneLeveledUp {
        user_id: UserId,
        zone: ZoneId,
        new_level: u32,
    },
    StreakUpdated {
        user_id: UserId,
        streak: u32,
    },
}

impl ProgressionEvent {
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::XpAwarded { user_id, .. }
            | Self::ZoneLeveledUp { user_id, .. }
            | Self::StreakUpdated { user_id, .. } => user_id,
            Self::LevelUp(level_up) => &level_up.user_id,
        }
    }

    /// Short name used in logs and the outbox file
    pub fn name(&self) -> &'static str {
        match self {
            Self::XpAwarded { .. } => "xp_awarded",
            Self::LevelUp(_) => "level_up",
            Self::ZoneLeveledUp { .. } => "zone_leveled_up",
            Self::StreakUpdated { .. } => "streak_updated",
        }
    }
}
