//! CLI command implementations

pub mod apply;
pub mod init;
pub mod record;
pub mod show;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use emerge::clock::{Clock, SystemClock};
use emerge::config::Config;
use emerge::progression::{InsightService, ProgressionEngine};
use emerge::store::{MemoryStore, SqliteStore, Store};

/// Configuration and open store shared by the commands
pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
}

impl AppContext {
    pub fn open(config_path: Option<&Path>, db: Option<&Path>, memory: bool) -> Result<Self> {
        let config = Config::load(config_path, Path::new("."))?;

        let store: Arc<dyn Store> = if memory {
            debug!("Using in-memory store");
            Arc::new(MemoryStore::new())
        } else {
            let path = db.map(Path::to_path_buf).unwrap_or_else(|| config.db_path());
            debug!("Opening store at {}", path.display());
            Arc::new(
                SqliteStore::open(&path)
                    .with_context(|| format!("Failed to open database: {}", path.display()))?,
            )
        };

        Ok(Self {
            config,
            store,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn engine(&self) -> ProgressionEngine {
        ProgressionEngine::from_config(self.store.clone(), self.clock.clone(), &self.config)
    }

    pub fn insights(&self) -> InsightService {
        InsightService::new(self.store.clone(), self.clock.clone(), &self.config.insight)
    }
}
