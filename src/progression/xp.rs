//! XP rewards for activities
//!
//! Gain = base XP for the activity type, scaled by habit difficulty, then by
//! the streak bonus. Each scaling step rounds half away from zero.

use crate::config::XpTable;
use crate::domain::{Activity, Difficulty};

/// Multiply by `percent / 100`, rounding half away from zero. Saturates.
fn apply_percent(xp: u64, percent: u32) -> u64 {
    xp.saturating_mul(u64::from(percent)).saturating_add(50) / 100
}

impl XpTable {
    /// Base XP for an activity type (0 for unrecognized types)
    pub fn base_xp(&self, activity: &Activity) -> u32 {
        match activity {
            Activity::HabitCompletion { .. } => self.habit_completion,
            Activity::JoinedChallenge => self.joined_challenge,
            Activity::JoinedTribe => self.joined_tribe,
            Activity::ReflectionSaved => self.reflection_saved,
            Activity::Unrecognized { .. } => 0,
        }
    }

    pub fn difficulty_percent(&self, difficulty: Difficulty) -> u32 {
        match difficulty {
            Difficulty::Easy => self.easy_percent,
            Difficulty::Medium => self.medium_percent,
            Difficulty::Hard => self.hard_percent,
        }
    }

    /// Streak bonus in percent: +per_step for every full step, capped
    /// Day 7 = 10%, day 14 = 20%, ... capped at 50%
    pub fn streak_bonus_percent(&self, streak_day: u32) -> u32 {
        let steps = streak_day / self.streak_step_days.max(1);
        steps
            .saturating_mul(self.streak_bonus_percent_per_step)
            .min(self.max_streak_bonus_percent)
    }
}

/// XP awarded for one activity
pub fn compute_xp_gain(table: &XpTable, activity: &Activity, streak_day: Option<u32>) -> u32 {
    let base = table.base_xp(activity);
    if base == 0 {
        return 0;
    }

    let mut xp = u64::from(base);

    if let Activity::HabitCompletion {
        difficulty: Some(difficulty),
        ..
    } = activity
    {
        xp = apply_percent(xp, table.difficulty_percent(*difficulty));
    }

    if let Some(day) = streak_day {
        let bonus = table.streak_bonus_percent(day);
        if bonus > 0 {
            xp = apply_percent(xp, bonus.saturating_add(100));
        }
    }

    u32::try_from(xp).unwrap_or(u32::MAX)
}
