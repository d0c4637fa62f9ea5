use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ZoneId;

/// State of one themed zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneState {
    pub level: u32,
    /// 0.0 - 1.0
    pub health: f64,
    pub milestone: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for ZoneState {
    fn default() -> Self {
        Self {
            level: 1,
            health: 1.0,
            milestone: 0,
            last_updated: None,
        }
    }
}

/// Gamified visualization state derived from habit completions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldState {
    #[serde(default)]
    pub zones: BTreeMap<ZoneId, ZoneState>,
    /// 1 - average zone health, never negative
    #[serde(default)]
    pub entropy: f64,
    pub last_active: Option<DateTime<Utc>>,
}

impl WorldState {
    pub fn zone(&self, id: &str) -> Option<&ZoneState> {
        self.zones.get(&ZoneId::from(id))
    }

    /// Average health across zones (1.0 for an empty world)
    pub fn average_health(&self) -> f64 {
        if self.zones.is_empty() {
            return 1.0;
        }
        let total: f64 = self.zones.values().map(|z| z.health).sum();
        total / self.zones.len() as f64
    }
}
