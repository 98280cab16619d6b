//! Configuration management
//!
//! Locates the memory directory and the scraper database, and holds the
//! insight scheduler settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that overrides the configured memory directory
pub const MEMORY_DIR_ENV: &str = "SETX_MEMORY_DIR";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Memory store settings
    #[serde(default)]
    pub memory: MemorySettings,
    /// Scraper database settings
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Periodic insight generation
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySettings {
    /// Directory holding the collection JSON files
    #[serde(default = "default_memory_dir")]
    pub memory_dir: PathBuf,
    /// Days of generated insights to keep
    #[serde(default = "default_retention_days")]
    pub insight_retention_days: i64,
    /// Agent name used when a command doesn't specify one
    #[serde(default = "default_agent")]
    pub default_agent: String,
}

fn default_memory_dir() -> PathBuf {
    data_dir()
        .map(|d| d.join("memory"))
        .unwrap_or_else(|_| PathBuf::from("memory"))
}

fn default_retention_days() -> i64 {
    crate::insights::INSIGHT_RETENTION_DAYS
}

fn default_agent() -> String {
    crate::types::DEFAULT_AGENT.to_string()
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            memory_dir: default_memory_dir(),
            insight_retention_days: default_retention_days(),
            default_agent: default_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the scraper SQLite database
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("database.sqlite")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Minutes between insight runs
    #[serde(default = "default_interval")]
    pub interval_minutes: u64,
    /// Back up each insight to the database
    #[serde(default = "default_true")]
    pub sync_snapshots: bool,
}

fn default_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval(),
            sync_snapshots: default_true(),
        }
    }
}

impl Config {
    /// Load configuration from file, writing defaults on first use
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            Self::from_toml(&contents)?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        config.apply_env();
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config file")
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(MEMORY_DIR_ENV) {
            if !dir.is_empty() {
                self.memory.memory_dir = PathBuf::from(dir);
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Open the memory store described by this configuration
    pub fn open_store(&self) -> Result<crate::memory::MemoryStore> {
        let store = crate::memory::MemoryStore::open(&self.memory.memory_dir)
            .with_context(|| format!("Failed to open memory store at {}", self.memory.memory_dir.display()))?
            .with_insight_retention_days(self.memory.insight_retention_days);
        Ok(store)
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "setx-events", "setx-memory")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "setx-events", "setx-memory")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}

/// Show current configuration
pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Configuration ({})", config_path()?.display());
    println!("  memory dir:         {}", config.memory.memory_dir.display());
    println!("  insight retention:  {} days", config.memory.insight_retention_days);
    println!("  default agent:      {}", config.memory.default_agent);
    println!("  database:           {}", config.database.path.display());
    println!("  scheduler interval: {} minutes", config.scheduler.interval_minutes);
    println!("  snapshot sync:      {}", if config.scheduler.sync_snapshots { "enabled" } else { "disabled" });

    Ok(())
}

/// Set the memory directory
pub fn set_memory_dir(path: &str) -> Result<()> {
    let mut config = Config::load()?;
    config.memory.memory_dir = PathBuf::from(path);
    config.save()?;
    println!("Memory directory set to {}", path);
    Ok(())
}

/// Set the scraper database path
pub fn set_database_path(path: &str) -> Result<()> {
    let mut config = Config::load()?;
    config.database.path = PathBuf::from(path);
    config.save()?;
    println!("Database path set to {}", path);
    Ok(())
}

/// Reset configuration to defaults
pub fn reset_config() -> Result<()> {
    let config = Config::default();
    config.save()?;
    println!("Configuration reset to defaults.");
    Ok(())
}
