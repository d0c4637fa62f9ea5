//! Show and insight command implementations

use anyhow::Result;

use emerge::progression::LevelProgress;
use emerge::UserId;

use super::AppContext;

/// Print a user's progression record and world
pub fn show_command(ctx: &AppContext, user: &str, json: bool) -> Result<()> {
    let user_id = UserId::from(user);
    let document = ctx.engine().document(&user_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    let record = &document.progression;
    let progress = LevelProgress::new(record.total_xp, ctx.config.progression.xp_per_level);

    println!("{}", user_id);
    println!(
        "  Level {} ({} XP, {:.0}% to next)",
        record.level,
        record.total_xp,
        progress.progress_to_next() * 100.0
    );
    println!("  Streak: {} days", record.streak);

    if !record.attribute_xp.is_empty() {
        println!("  Attributes:");
        for (attribute, xp) in &record.attribute_xp {
            println!("    {:<12} {}", attribute, xp);
        }
    }

    let world = &document.world;
    if !world.zones.is_empty() {
        println!("  World (entropy {:.2}):", world.entropy);
        for (zone, state) in &world.zones {
            println!(
                "    {:<18} level {} milestone {} health {:.1}",
                zone, state.level, state.milestone, state.health
            );
        }
    }

    Ok(())
}

/// Print the (possibly cached) insight for a user
pub fn insight_command(ctx: &AppContext, user: &str) -> Result<()> {
    let insight = ctx.insights().get_insight(&UserId::from(user))?;
    println!("{}", insight.text);
    Ok(())
}
