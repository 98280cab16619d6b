//! Periodic insight generation
//!
//! Regenerates learning insights on a fixed interval and optionally backs
//! each one up to the snapshot table, until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::memory::{MemoryStore, SnapshotStore};

/// Result of a single scheduler tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Insights generated (and synced when a database is attached)
    Generated { synced: bool, focus_areas: usize },
    Error(String),
}

impl std::fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickOutcome::Generated { synced: true, focus_areas } => {
                write!(f, "Insights generated and synced ({} focus areas)", focus_areas)
            }
            TickOutcome::Generated { synced: false, focus_areas } => {
                write!(f, "Insights generated ({} focus areas)", focus_areas)
            }
            TickOutcome::Error(e) => write!(f, "Error: {}", e),
        }
    }
}

pub struct InsightScheduler {
    store: Arc<MemoryStore>,
    snapshots: Option<SnapshotStore>,
    interval: Duration,
}

impl InsightScheduler {
    pub fn new(store: Arc<MemoryStore>, config: &SchedulerConfig) -> Self {
        Self {
            store,
            snapshots: None,
            interval: Duration::from_secs(config.interval_minutes.max(1) * 60),
        }
    }

    pub fn with_snapshots(mut self, snapshots: SnapshotStore) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn tick(&self) -> TickOutcome {
        let result = match &self.snapshots {
            Some(snapshots) => self.store.sync_to_database(snapshots).await.map(|i| (i, true)),
            None => self.store.generate_insights().map(|i| (i, false)),
        };
        match result {
            Ok((insight, synced)) => TickOutcome::Generated {
                synced,
                focus_areas: insight.recommended_focus_areas.len(),
            },
            Err(e) => TickOutcome::Error(e.to_string()),
        }
    }

    /// Run until the shutdown channel fires. The first tick happens
    /// immediately.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Insight scheduler started (interval: {}s)", self.interval.as_secs());
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        outcome @ TickOutcome::Generated { .. } => debug!("Scheduler: {}", outcome),
                        TickOutcome::Error(e) => warn!("Scheduler error: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Insight scheduler shutting down");
                    break;
                }
            }
        }
    }
}
