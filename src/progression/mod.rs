//! Progression: XP, levels, world zones and insights
//!
//! Pure calculations live in `xp`, `levels` and `zones`. `engine` wraps them
//! in an optimistic transaction against a `Store`.

mod engine;
mod events;
mod insight;
mod levels;
mod xp;
mod zones;

pub use engine::{ApplyError, ApplyOutcome, ApplyStatus, ProgressionEngine, reduce};
pub use events::{LevelUp, ProgressionEvent};
pub use insight::{Insight, InsightService, derive_insight};
pub use levels::{LevelProgress, level_from_xp, xp_for_level};
pub use xp::compute_xp_gain;
pub use zones::{DEFAULT_ZONE, decay_world, update_zone, zone_for};
