//! Configuration loading and management

mod io;
mod settings;

pub use settings::{
    DispatchSettings, InsightSettings, MAX_INSIGHT_TTL_MINUTES, ProgressionSettings, RetrySettings,
    StoreSettings, XpTable,
};

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// XP table, level curve and idempotency window
    #[serde(default)]
    pub progression: ProgressionSettings,

    /// Transaction conflict retry policy
    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub insight: InsightSettings,

    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub store: StoreSettings,
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory
    /// Looks for: .emerge/config.toml (preferred) or emerge.toml
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let nested = dir.join(".emerge/config.toml");
        if nested.exists() {
            return Self::from_file(&nested);
        }

        let flat = dir.join("emerge.toml");
        if flat.exists() {
            return Self::from_file(&flat);
        }

        Ok(Self::default())
    }

    /// Reject settings that would break progression invariants
    pub fn validate(&self) -> Result<()> {
        if self.progression.xp_per_level == 0 {
            anyhow::bail!("progression.xp_per_level must be greater than 0");
        }
        if self.progression.xp.streak_step_days == 0 {
            anyhow::bail!("progression.xp.streak_step_days must be greater than 0");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if !(1..=MAX_INSIGHT_TTL_MINUTES).contains(&self.insight.ttl_minutes) {
            anyhow::bail!(
                "insight.ttl_minutes must be between 1 and {}, got {}",
                MAX_INSIGHT_TTL_MINUTES,
                self.insight.ttl_minutes
            );
        }
        if self.dispatch.concurrency == 0 {
            anyhow::bail!("dispatch.concurrency must be at least 1");
        }
        Ok(())
    }
}
