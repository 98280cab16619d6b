//! SETX Memory - shared learning store for the SETX Events scraper agents
//!
//! Scraper agents record what worked (venue patterns, prompts, extraction
//! examples, run metrics) and what didn't (errors, failed decisions). Later
//! runs read that memory back to build better prompts, and the insight
//! generator summarizes it.
//!
//! # Example
//!
//! ```ignore
//! use setx_memory::{MemoryStore, Venue, ScrapedEvent};
//!
//! let store = MemoryStore::open("memory")?;
//! let venue = Venue::new(7, "Jefferson Theatre").with_city("Beaumont");
//! store.record_venue_learning(7, &venue, &[ScrapedEvent::new("Symphony Gala")], "perplexity")?;
//! let prompt = store.learned_prompt(&venue, "ollama-local", 3);
//! ```

pub mod types;
pub mod memory;
pub mod insights;
pub mod prompt;
pub mod config;
pub mod scheduler;
pub mod cli;

pub use memory::{
    Decision,
    ErrorRecord,
    MemoryError,
    MemoryStore,
    RunMetrics,
    SnapshotStore,
    VenueProfile,
};

pub use insights::Insight;
pub use config::Config;
pub use types::{Outcome, ScrapedEvent, Venue, VenueId};
