use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::activity::Attribute;
use super::ids::EventId;
use super::world::WorldState;

/// Default number of event ids remembered per record
pub const DEFAULT_RECENT_EVENT_CAPACITY: usize = 64;

/// Bounded FIFO log of recently applied event ids
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecentEvents(VecDeque<EventId>);

impl RecentEvents {
    pub fn contains(&self, id: &EventId) -> bool {
        self.0.contains(id)
    }

    /// Remember an id, evicting the oldest entries beyond `capacity`
    pub fn push(&mut self, id: EventId, capacity: usize) {
        if self.contains(&id) {
            return;
        }
        self.0.push_back(id);
        while self.0.len() > capacity.max(1) {
            self.0.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventId> {
        self.0.iter()
    }
}

/// Per-user progression aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionRecord {
    pub total_xp: u64,
    /// XP per attribute. Gains without an attribute only count toward
    /// `total_xp`, so the buckets may sum to less than the total.
    #[serde(default)]
    pub attribute_xp: BTreeMap<Attribute, u64>,
    pub level: u32,
    pub streak: u32,
    #[serde(default)]
    pub recent_event_ids: RecentEvents,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ProgressionRecord {
    fn default() -> Self {
        Self {
            total_xp: 0,
            attribute_xp: BTreeMap::new(),
            level: 1,
            streak: 0,
            recent_event_ids: RecentEvents::default(),
            updated_at: None,
        }
    }
}

impl ProgressionRecord {
    pub fn attribute_xp(&self, attribute: Attribute) -> u64 {
        self.attribute_xp.get(&attribute).copied().unwrap_or(0)
    }
}

/// Everything stored for one user: the record and its derived world
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserDocument {
    pub progression: ProgressionRecord,
    #[serde(default)]
    pub world: WorldState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_events_evicts_oldest() {
        let mut log = RecentEvents::default();
        for i in 0..5 {
            log.push(EventId::new(format!("e{}", i)), 3);
        }
        assert_eq!(log.len(), 3);
        assert!(!log.contains(&EventId::from("e0")));
        assert!(!log.contains(&EventId::from("e1")));
        assert!(log.contains(&EventId::from("e4")));
    }

    #[test]
    fn test_recent_events_ignores_repeat() {
        let mut log = RecentEvents::default();
        log.push(EventId::from("e1"), 8);
        log.push(EventId::from("e1"), 8);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_default_record_is_level_one() {
        let record = ProgressionRecord::default();
        assert_eq!(record.level, 1);
        assert_eq!(record.total_xp, 0);
        assert_eq!(record.attribute_xp(Attribute::Focus), 0);
    }
}
