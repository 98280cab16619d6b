//! CLI interface for setx-memory

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::config::Config;
use crate::memory::{MemoryStore, SnapshotStore};
use crate::types::VenueId;

#[derive(Parser)]
#[command(name = "setx-memory")]
#[command(about = "Shared scraping memory and learning insights for SETX Events agents", long_about = None)]
#[command(version)]
struct Cli {
    /// Memory directory (overrides config and SETX_MEMORY_DIR)
    #[arg(long, global = true)]
    memory_dir: Option<String>,

    /// Scraper database path (overrides config)
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the memory directory and empty collection files
    Init,
    /// Generate learning insights from everything recorded so far
    Insights {
        /// Print the insight as JSON
        #[arg(long)]
        json: bool,
        /// Also back the insight up to the database
        #[arg(long)]
        sync: bool,
    },
    /// Show the learned profile for a venue
    Venue {
        /// Venue ID
        id: VenueId,
    },
    /// List learned venue profiles
    Venues {
        /// List active venues from the database with their learned state
        #[arg(long)]
        from_db: bool,
    },
    /// Show the best recorded prompt for a venue
    Prompt {
        /// Venue ID
        venue_id: VenueId,
        /// Agent name (default from config)
        #[arg(short, long)]
        agent: Option<String>,
    },
    /// Build the learned-context prompt for a venue from the database
    Context {
        /// Venue ID
        venue_id: VenueId,
        /// Agent name (default from config)
        #[arg(short, long)]
        agent: Option<String>,
        /// Number of extraction examples to include
        #[arg(short, long, default_value = "3")]
        limit: usize,
    },
    /// Show recent successful extractions for a venue
    Examples {
        /// Venue ID
        venue_id: VenueId,
        /// Maximum examples to show
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },
    /// Compare agent performance
    Agents,
    /// Show common error patterns
    Errors,
    /// Show per-agent decision outcomes
    Decisions,
    /// Back up a fresh insight snapshot to the database
    Sync,
    /// Regenerate insights periodically until interrupted
    Watch {
        /// Minutes between runs (default from config)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Configure the memory store
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Set the memory directory
        #[arg(long)]
        set_memory_dir: Option<String>,
        /// Set the scraper database path
        #[arg(long)]
        set_database: Option<String>,
        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { show, set_memory_dir, set_database, reset } = &cli.command {
        if *reset {
            crate::config::reset_config()?;
        }
        if let Some(dir) = set_memory_dir {
            crate::config::set_memory_dir(dir)?;
        }
        if let Some(path) = set_database {
            crate::config::set_database_path(path)?;
        }
        if *show || (!*reset && set_memory_dir.is_none() && set_database.is_none()) {
            crate::config::show_config()?;
        }
        return Ok(());
    }

    let mut config = Config::load()?;
    if let Some(dir) = &cli.memory_dir {
        config.memory.memory_dir = dir.into();
    }
    if let Some(path) = &cli.database {
        config.database.path = path.into();
    }
    let store = config.open_store()?;
    let default_agent = config.memory.default_agent.clone();

    match cli.command {
        Commands::Init => {
            println!("Memory store ready at {}", store.dir().display());
        }
        Commands::Insights { json, sync } => {
            let insight = if sync {
                let snapshots = open_snapshots(&config).await?;
                store.sync_to_database(&snapshots).await?
            } else {
                store.generate_insights()?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&insight)?);
            } else {
                println!("Learning Insights ({})", insight.timestamp.format("%Y-%m-%d %H:%M UTC"));
                println!("=================");
                print!("{}", insight.summary());
            }
        }
        Commands::Venue { id } => match store.get_venue_profile(id) {
            Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
            None => println!("No profile learned for venue {}", id),
        },
        Commands::Venues { from_db: true } => {
            let snapshots = open_snapshots(&config).await?;
            let venues = store.active_venue_profiles(&snapshots.venues()).await?;
            println!("{} active venues in {}:", venues.len(), config.database.path.display());
            for (venue, profile) in &venues {
                match profile {
                    Some(p) => println!("  {:>5}  {} ({} scrapes learned)", venue.id, venue.name, p.successful_scrapes_count),
                    None => println!("  {:>5}  {} (not learned yet)", venue.id, venue.name),
                }
            }
        }
        Commands::Venues { from_db: false } => {
            let profiles = store.all_venue_profiles();
            if profiles.is_empty() {
                println!("No venue profiles yet.");
            } else {
                println!("{} venue profiles:", profiles.len());
                for (id, profile) in &profiles {
                    println!(
                        "  {:>5}  {} ({} scrapes, last from {})",
                        id,
                        profile.name,
                        profile.successful_scrapes_count,
                        profile.last_learning_from.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Commands::Prompt { venue_id, agent } => {
            let agent = agent.unwrap_or(default_agent);
            match store.get_best_prompt(venue_id, &agent) {
                Some(prompt) => println!("{}", prompt),
                None => println!("No prompt recorded for venue {} / {}", venue_id, agent),
            }
        }
        Commands::Context { venue_id, agent, limit } => {
            let agent = agent.unwrap_or(default_agent);
            let snapshots = open_snapshots(&config).await?;
            let venue = snapshots
                .venues()
                .venue(venue_id)
                .await?
                .with_context(|| format!("Venue {} not found in {}", venue_id, config.database.path.display()))?;
            println!("{}", store.learned_prompt(&venue, &agent, limit));
        }
        Commands::Examples { venue_id, limit } => {
            let examples = store.get_extraction_examples(venue_id, limit);
            if examples.is_empty() {
                println!("No extractions recorded for venue {}", venue_id);
            } else {
                println!("{}", serde_json::to_string_pretty(&examples)?);
            }
        }
        Commands::Agents => {
            let comparison = store.agent_comparison();
            if comparison.is_empty() {
                println!("No agent runs recorded.");
            }
            for (agent, c) in &comparison {
                println!(
                    "  {}: {:.1}% success, {} events, {:.1}% duplicates, {} errors",
                    agent,
                    c.success_rate * 100.0,
                    c.events_scraped,
                    c.duplicate_detection_rate * 100.0,
                    c.error_handling_rate
                );
            }
        }
        Commands::Errors => {
            let patterns = store.error_patterns();
            if patterns.is_empty() {
                println!("No errors recorded.");
            }
            for (kind, pattern) in &patterns {
                println!(
                    "  {} x{} (last {})",
                    kind,
                    pattern.count,
                    pattern
                        .last_occurrence
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
                if let Some(resolution) = pattern.resolutions.last() {
                    println!("    last resolution: {}", resolution);
                }
            }
        }
        Commands::Decisions => match store.analyze_decision_patterns() {
            Some(patterns) => {
                for (agent, p) in &patterns {
                    println!("  {}: {} successful, {} failed, {} total", agent, p.successful, p.failed, p.total);
                }
            }
            None => println!("No decisions recorded."),
        },
        Commands::Sync => {
            let snapshots = open_snapshots(&config).await?;
            store.sync_to_database(&snapshots).await?;
            println!("Insight snapshot saved to {}", config.database.path.display());
        }
        Commands::Watch { interval } => {
            if let Some(minutes) = interval {
                config.scheduler.interval_minutes = minutes;
            }
            watch(store, &config).await?;
        }
        Commands::Config { .. } => unreachable!("handled above"),
    }

    Ok(())
}

async fn open_snapshots(config: &Config) -> Result<SnapshotStore> {
    SnapshotStore::new(&config.database.path)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))
}

async fn watch(store: MemoryStore, config: &Config) -> Result<()> {
    let mut scheduler = crate::scheduler::InsightScheduler::new(Arc::new(store), &config.scheduler);
    if config.scheduler.sync_snapshots {
        scheduler = scheduler.with_snapshots(open_snapshots(config).await?);
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    println!("Generating insights every {} minutes. Press Ctrl+C to stop.", config.scheduler.interval_minutes);
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
    let _ = shutdown_tx.send(());
    handle.await.context("Scheduler task failed")?;
    Ok(())
}
