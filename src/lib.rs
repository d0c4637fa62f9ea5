//! Emerge - habit progression engine
//!
//! Emerge turns activity events (habit completions, joining challenges or
//! tribes, saved reflections) into experience points, levels, streaks and
//! a small gamified world whose zones grow with the habits that feed them.
//!
//! ## Guarantees
//!
//! - Each event id is applied at most once per user, even when delivered
//!   repeatedly.
//! - Concurrent applies for one user never lose an update: writes are
//!   optimistic transactions that retry on conflict.
//! - Notifications are sent only for committed changes.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod ingest;
pub mod notify;
pub mod progression;
pub mod store;

pub use domain::*;
