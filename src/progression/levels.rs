//! XP and Level system
//!
//! One canonical, linear curve: `level = total_xp / xp_per_level + 1`.
//! Every place that derives a level goes through `level_from_xp`.

use serde::Serialize;

/// Level for a total XP amount (always >= 1, non-decreasing in XP)
pub fn level_from_xp(total_xp: u64, xp_per_level: u64) -> u32 {
    let level = total_xp / xp_per_level.max(1) + 1;
    u32::try_from(level).unwrap_or(u32::MAX)
}

/// Total XP at which `level` starts
pub fn xp_for_level(level: u32, xp_per_level: u64) -> u64 {
    u64::from(level.max(1) - 1).saturating_mul(xp_per_level.max(1))
}

/// Where a player stands within the current level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelProgress {
    pub total_xp: u64,
    pub level: u32,
    /// XP at which the current level started
    pub current_level_xp: u64,
    /// XP at which the next level starts
    pub next_level_xp: u64,
}

impl LevelProgress {
    pub fn new(total_xp: u64, xp_per_level: u64) -> Self {
        let level = level_from_xp(total_xp, xp_per_level);
        Self {
            total_xp,
            level,
            current_level_xp: xp_for_level(level, xp_per_level),
            next_level_xp: xp_for_level(level.saturating_add(1), xp_per_level),
        }
    }

    /// Progress toward the next level (0.0 - 1.0)
    pub fn progress_to_next(&self) -> f32 {
        let span = self.next_level_xp.saturating_sub(self.current_level_xp);
        if span == 0 {
            return 1.0;
        }
        let into = self.total_xp.saturating_sub(self.current_level_xp);
        into as f32 / span as f32
    }
}
