//! World zones driven by habit completions
//!
//! Each attribute feeds a themed zone. Completions heal the zone and count
//! toward its milestones; every `level * 10` milestones the zone levels up.

use chrono::{DateTime, Utc};

use crate::domain::{Attribute, WorldState, ZoneId, ZoneState};

/// Zone for attributes without one of their own
pub const DEFAULT_ZONE: &str = "park";

const HEALTH_PER_COMPLETION: f64 = 0.1;
const MILESTONES_PER_LEVEL: u32 = 10;

/// Zone fed by an attribute
pub fn zone_for(attribute: Attribute) -> &'static str {
    match attribute {
        Attribute::Strength => "strength_training",
        Attribute::Intellect => "library",
        Attribute::Vitality => "park",
        Attribute::Creativity => "studio",
        Attribute::Focus => "shrine",
        _ => DEFAULT_ZONE,
    }
}

fn entropy_of(world: &WorldState) -> f64 {
    (1.0 - world.average_health()).max(0.0)
}

/// Apply one habit outcome to the zone of `attribute`
pub fn update_zone(
    world: &WorldState,
    attribute: Attribute,
    completed: bool,
    now: DateTime<Utc>,
) -> WorldState {
    let mut next = world.clone();
    let zone_id = ZoneId::from(zone_for(attribute));
    let zone = next.zones.entry(zone_id).or_insert_with(ZoneState::default);

    if completed {
        zone.health = (zone.health + HEALTH_PER_COMPLETION).min(1.0);
        zone.milestone += 1;
        if zone.milestone >= zone.level * MILESTONES_PER_LEVEL {
            zone.level += 1;
            zone.milestone = 0;
        }
    }
    zone.last_updated = Some(now);

    next.entropy = entropy_of(&next);
    next.last_active = Some(now);
    next
}

/// Lower every zone's health by `amount` (inactivity), recomputing entropy
pub fn decay_world(world: &WorldState, amount: f64) -> WorldState {
    let mut next = world.clone();
    for zone in next.zones.values_mut() {
        zone.health = (zone.health - amount.max(0.0)).clamp(0.0, 1.0);
    }
    next.entropy = entropy_of(&next);
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_three_completions_cap_health() {
        let mut world = WorldState::default();
        for _ in 0..3 {
            world = update_zone(&world, Attribute::Intellect, true, now());
        }
        let zone = world.zone("library").unwrap();
        assert_eq!(zone.level, 1);
        assert_eq!(zone.milestone, 3);
        assert_eq!(zone.health, 1.0);
        assert_eq!(world.entropy, 0.0);
    }

    #[test]
    fn test_ten_completions_level_zone() {
        let mut world = WorldState::default();
        for _ in 0..10 {
            world = update_zone(&world, Attribute::Strength, true, now());
        }
        let zone = world.zone("strength_training").unwrap();
        assert_eq!(zone.level, 2);
        assert_eq!(zone.milestone, 0);

        // Level 2 needs 20 more
        for _ in 0..19 {
            world = update_zone(&world, Attribute::Strength, true, now());
        }
        assert_eq!(world.zone("strength_training").unwrap().level, 2);
        world = update_zone(&world, Attribute::Strength, true, now());
        assert_eq!(world.zone("strength_training").unwrap().level, 3);
    }

    #[test]
    fn test_unmapped_attribute_uses_default_zone() {
        let world = update_zone(&WorldState::default(), Attribute::Spirit, true, now());
        assert!(world.zone(DEFAULT_ZONE).is_some());
        assert_eq!(world.zones.len(), 1);
    }

    #[test]
    fn test_entropy_tracks_average_health() {
        let mut world = WorldState::default();
        world = update_zone(&world, Attribute::Focus, true, now());
        world = update_zone(&world, Attribute::Creativity, true, now());
        world = decay_world(&world, 0.5);
        assert!((world.entropy - 0.5).abs() < 1e-9);

        // Heals shrine only: (0.6 + 0.5) / 2 = 0.55 -> entropy 0.45
        world = update_zone(&world, Attribute::Focus, true, now());
        assert!((world.entropy - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_not_completed_leaves_zone_values() {
        let world = update_zone(&WorldState::default(), Attribute::Focus, false, now());
        let zone = world.zone("shrine").unwrap();
        assert_eq!(zone.milestone, 0);
        assert_eq!(zone.health, 1.0);
        assert_eq!(zone.last_updated, Some(now()));
    }

    #[test]
    fn test_update_is_pure() {
        let world = WorldState::default();
        let _ = update_zone(&world, Attribute::Focus, true, now());
        assert!(world.zones.is_empty());
    }
}
