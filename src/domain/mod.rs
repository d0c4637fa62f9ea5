//! Core domain types for Emerge

mod activity;
mod ids;
mod progression;
mod world;

pub use activity::{Activity, ActivityEvent, Attribute, Difficulty, MalformedEvent, RawActivity};
pub use ids::{EventId, HabitId, UserId, ZoneId};
pub use progression::{DEFAULT_RECENT_EVENT_CAPACITY, ProgressionRecord, RecentEvents, UserDocument};
pub use world::{WorldState, ZoneState};
