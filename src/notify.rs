//! Notification sinks for progression events
//!
//! Delivery is best-effort and happens strictly after the commit; a sink
//! failure is logged and never undoes or repeats the apply.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::progression::ProgressionEvent;

/// Receives events produced by committed applies
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &ProgressionEvent) -> Result<()>;

    /// Sink name for logs
    fn id(&self) -> &str;
}

/// Logs every event through tracing
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, event: &ProgressionEvent) -> Result<()> {
        match event {
            ProgressionEvent::LevelUp(level_up) => info!(
                "🎉 {} reached level {} (was {})",
                level_up.user_id, level_up.new_level, level_up.old_level
            ),
            ProgressionEvent::XpAwarded {
                user_id,
                amount,
                total_xp,
                ..
            } => info!("{} +{} XP ({} total)", user_id, amount, total_xp),
            ProgressionEvent::ZoneLeveledUp {
                user_id,
                zone,
                new_level,
            } => info!("{}'s {} grew to level {}", user_id, zone, new_level),
            ProgressionEvent::StreakUpdated { user_id, streak } => {
                info!("{} is on a {}-day streak", user_id, streak)
            }
        }
        Ok(())
    }

    fn id(&self) -> &str {
        "tracing"
    }
}

/// Appends events as JSON lines to a file
pub struct JsonlSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl NotificationSink for JsonlSink {
    async fn notify(&self, event: &ProgressionEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        // One writer at a time so lines never interleave
        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    fn id(&self) -> &str {
        "jsonl"
    }
}

/// Fans events out to several sinks
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl NotificationSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotificationSink for MultiSink {
    async fn notify(&self, event: &ProgressionEvent) -> Result<()> {
        let mut failed = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.notify(event).await {
                warn!("Sink {} failed for {}: {:#}", sink.id(), event.name(), e);
                failed.push(sink.id().to_string());
            }
        }
        if !failed.is_empty() {
            anyhow::bail!("sinks failed: {}", failed.join(", "));
        }
        Ok(())
    }

    fn id(&self) -> &str {
        "multi"
    }
}

/// Send every event, logging failures. Returns how many were delivered.
pub async fn deliver_all(sink: &dyn NotificationSink, events: &[ProgressionEvent]) -> usize {
    let mut delivered = 0;
    for event in events {
        match sink.notify(event).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!(
                "Failed to deliver {} for {} via {}: {:#}",
                event.name(),
                event.user_id(),
                sink.id(),
                e
            ),
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;
    use crate::progression::LevelUp;

    fn level_up() -> ProgressionEvent {
        ProgressionEvent::LevelUp(LevelUp {
            user_id: UserId::from("u1"),
            old_level: 1,
            new_level: 2,
        })
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("out").join("events.jsonl"));

        sink.notify(&level_up()).await.unwrap();
        sink.notify(&ProgressionEvent::StreakUpdated {
            user_id: UserId::from("u1"),
            streak: 4,
        })
        .await
        .unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: ProgressionEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, level_up());
        assert!(lines[1].contains("\"kind\":\"streak_updated\""));
    }

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn notify(&self, _event: &ProgressionEvent) -> Result<()> {
            anyhow::bail!("unreachable")
        }

        fn id(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_deliver_all_counts_successes_only() {
        let events = vec![level_up(), level_up()];
        assert_eq!(deliver_all(&TracingSink, &events).await, 2);
        assert_eq!(deliver_all(&FailingSink, &events).await, 0);

        let multi = MultiSink::new().with(TracingSink).with(FailingSink);
        assert!(multi.notify(&level_up()).await.is_err());
    }
}
