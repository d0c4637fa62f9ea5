//! Configuration file I/O operations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::Config;

impl Config {
    /// Get the global config directory path (~/.emerge/)
    pub fn global_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".emerge")
    }

    /// Get the global config file path (~/.emerge/config.toml)
    pub fn global_config_path() -> PathBuf {
        Self::global_config_dir().join("config.toml")
    }

    /// Resolve configuration: explicit file, else project config in `dir`,
    /// else the global config, else defaults
    pub fn load(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if dir.join(".emerge/config.toml").exists() || dir.join("emerge.toml").exists() {
            return Self::from_dir(dir);
        }
        let global = Self::global_config_path();
        if global.exists() {
            return Self::from_file(&global);
        }
        Ok(Self::default())
    }

    /// Database path from `[store]`, or ~/.emerge/progression.db
    pub fn db_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| Self::global_config_dir().join("progression.db"))
    }

    /// Serialize to TOML and write to `path`, creating parent directories
    pub fn save_to_file(&self, path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            bail!(
                "Config file already exists: {} (use --force to overwrite)",
                path.display()
            );
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, format!("{}{}", CONFIG_HEADER, content))
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

const CONFIG_HEADER: &str = r#"# Emerge progression configuration
#
# progression.xp        - base XP per activity type and percent multipliers
# progression           - xp_per_level (level = total_xp / xp_per_level + 1)
# retry                 - backoff for conflicting transactions
# insight.ttl_minutes   - how long an insight stays cached
# dispatch              - concurrency and redelivery limits

"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".emerge/config.toml");

        let mut config = Config::default();
        config.progression.xp_per_level = 250;
        config.save_to_file(&path, false).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);

        assert!(config.save_to_file(&path, false).is_err());
        assert!(config.save_to_file(&path, true).is_ok());
    }
}
