//! Record command implementation

use std::sync::Arc;

use anyhow::{Context, Result};

use emerge::notify::{TracingSink, deliver_all};
use emerge::progression::ApplyStatus;
use emerge::{ActivityEvent, RawActivity, UserId};

use super::AppContext;

pub struct RecordArgs {
    pub user: String,
    pub activity_type: String,
    pub difficulty: Option<String>,
    pub attribute: Option<String>,
    pub habit: Option<String>,
    pub streak_day: Option<u32>,
    pub event_id: Option<String>,
}

/// Apply one activity built from command-line flags
pub async fn record_command(ctx: &AppContext, args: RecordArgs) -> Result<()> {
    let raw = RawActivity {
        event_id: Some(
            args.event_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        ),
        user_id: Some(args.user),
        activity_type: Some(args.activity_type),
        habit_id: args.habit,
        difficulty: args.difficulty,
        attribute: args.attribute,
        streak_day: args.streak_day,
        occurred_at: Some(chrono::Utc::now()),
    };
    let event = ActivityEvent::try_from(raw)?;
    let user_id: UserId = event.user_id.clone();

    let engine = Arc::new(ctx.engine());
    let outcome = tokio::task::spawn_blocking(move || engine.apply(&user_id, &event))
        .await
        .context("Apply task aborted")??;

    deliver_all(&TracingSink, &outcome.events).await;

    match outcome.status {
        ApplyStatus::Applied => println!(
            "+{} XP -> {} XP, level {}",
            outcome.gain, outcome.record.total_xp, outcome.record.level
        ),
        ApplyStatus::Duplicate => println!("Already recorded; nothing changed."),
        ApplyStatus::Ignored => println!("Activity type earns no XP; nothing changed."),
    }

    if let Some(level_up) = outcome.level_up() {
        println!("🎉 Level up! {} -> {}", level_up.old_level, level_up.new_level);
    }

    Ok(())
}
