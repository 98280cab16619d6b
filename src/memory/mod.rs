//! Shared scraping memory
//!
//! Provides:
//! - Venue profiles learned from successful scrapes
//! - Best-prompt tracking per (venue, agent)
//! - Extraction pattern history with success rates
//! - Decision, error and successful-extraction logs
//! - Rolling agent performance
//! - SQLite snapshot backups of generated insights

pub mod bounded;
pub mod error;
pub mod files;
pub mod model;
pub mod sqlite;
pub mod store;

pub use bounded::BoundedLog;
pub use error::{MemoryError, Result};
pub use files::{Collection, MemoryFiles};
pub use model::{
    AgentPerformance, AgentRun, CostMetrics, Decision, ErrorRecord, ExtractionPatternSet,
    PatternAttempt, PromptRecord, PromptTemplate, RunMetrics, SuccessfulExtraction, VenueProfile,
};
pub use sqlite::{Snapshot, SnapshotStore, VenueCatalog, LEARNING_INSIGHTS_SNAPSHOT};
pub use store::MemoryStore;
