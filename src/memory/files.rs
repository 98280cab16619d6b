//! Collection documents on disk
//!
//! Each collection lives in its own JSON file under the memory directory and
//! is always read and written whole. Writes go through a temp file in the
//! same directory and are renamed into place, so readers never observe a
//! partially written document.
//!
//! There is no cross-process locking. Two processes that load, mutate and
//! save the same collection concurrently race, and the last save wins.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::error::{MemoryError, Result};

/// The eight memory collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    VenueProfiles,
    PromptTemplates,
    ExtractionPatterns,
    ScrapingDecisions,
    AgentPerformance,
    ErrorLog,
    SuccessfulExtractions,
    LearningInsights,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Collection::VenueProfiles,
        Collection::PromptTemplates,
        Collection::ExtractionPatterns,
        Collection::ScrapingDecisions,
        Collection::AgentPerformance,
        Collection::ErrorLog,
        Collection::SuccessfulExtractions,
        Collection::LearningInsights,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Collection::VenueProfiles => "venue-profiles.json",
            Collection::PromptTemplates => "prompt-templates.json",
            Collection::ExtractionPatterns => "extraction-patterns.json",
            Collection::ScrapingDecisions => "scraping-decisions.json",
            Collection::AgentPerformance => "agent-performance.json",
            Collection::ErrorLog => "error-log.json",
            Collection::SuccessfulExtractions => "successful-extractions.json",
            Collection::LearningInsights => "learning-insights.json",
        }
    }

    /// Keyed collections are JSON objects, logs are JSON arrays
    pub fn is_log(&self) -> bool {
        matches!(
            self,
            Collection::ScrapingDecisions
                | Collection::ErrorLog
                | Collection::SuccessfulExtractions
                | Collection::LearningInsights
        )
    }

    fn empty_document(&self) -> &'static str {
        if self.is_log() { "[]" } else { "{}" }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_name().trim_end_matches(".json"))
    }
}

/// Resolves collection paths inside one memory directory
#[derive(Debug, Clone)]
pub struct MemoryFiles {
    dir: PathBuf,
}

impl MemoryFiles {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }

    /// Create the directory and seed any missing collection files
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| MemoryError::io(&self.dir, e))?;
        for collection in Collection::ALL {
            let path = self.path(collection);
            if !path.exists() {
                write_atomic(&path, collection.empty_document().as_bytes())?;
                debug!("Initialized {}", path.display());
            }
        }
        Ok(())
    }

    /// Load a collection, degrading to the empty value when the file is
    /// missing or unreadable. Never touches the file on disk.
    pub fn load<T: DeserializeOwned + Default>(&self, collection: Collection) -> T {
        match self.read_document(collection) {
            Document::Loaded(value) => value,
            Document::Missing | Document::Corrupt => T::default(),
        }
    }

    /// Load a collection that is about to be rewritten. A corrupt file is
    /// moved aside first so the save that follows can't destroy it; if it
    /// can't be moved the update is refused. Callers must hold the store's
    /// write lock.
    pub fn load_for_update<T: DeserializeOwned + Default>(&self, collection: Collection) -> Result<T> {
        match self.read_document(collection) {
            Document::Loaded(value) => Ok(value),
            Document::Missing => Ok(T::default()),
            Document::Corrupt => {
                let path = self.path(collection);
                let aside = aside_path(&path, Utc::now());
                std::fs::rename(&path, &aside).map_err(|e| MemoryError::io(&path, e))?;
                warn!("Moved malformed {} to {}", path.display(), aside.display());
                Ok(T::default())
            }
        }
    }

    fn read_document<T: DeserializeOwned>(&self, collection: Collection) -> Document<T> {
        let path = self.path(collection);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} not found, using empty collection", path.display());
                return Document::Missing;
            }
            Err(e) => {
                warn!("Error reading {}, using empty collection: {}", path.display(), e);
                return Document::Missing;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(value) => Document::Loaded(value),
            Err(e) => {
                warn!("Malformed {} ({}), using empty collection", path.display(), e);
                Document::Corrupt
            }
        }
    }

    pub fn save<T: Serialize>(&self, collection: Collection, value: &T) -> Result<()> {
        let path = self.path(collection);
        let json = serde_json::to_vec_pretty(value).map_err(|e| MemoryError::json(&path, e))?;
        write_atomic(&path, &json)
    }
}

enum Document<T> {
    Loaded(T),
    Missing,
    Corrupt,
}

/// `<name>.json.corrupt-<timestamp>`, with a numeric suffix if that name is
/// already taken
fn aside_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let mut base = path.as_os_str().to_owned();
    base.push(format!(".corrupt-{}", at.format("%Y%m%dT%H%M%S")));

    let mut candidate = PathBuf::from(&base);
    let mut n = 1;
    while candidate.exists() {
        let mut numbered = base.clone();
        numbered.push(format!("-{}", n));
        candidate = PathBuf::from(numbered);
        n += 1;
    }
    candidate
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| MemoryError::io(dir, e))?;
    tmp.write_all(contents).map_err(|e| MemoryError::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| MemoryError::io(path, e))?;
    tmp.persist(path).map_err(|e| MemoryError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_ensure_seeds_empty_documents() {
        let dir = tempfile::tempdir().unwrap();
        let files = MemoryFiles::new(dir.path().join("memory"));
        files.ensure().unwrap();

        for collection in Collection::ALL {
            let contents = std::fs::read_to_string(files.path(collection)).unwrap();
            if collection.is_log() {
                assert_eq!(contents, "[]");
            } else {
                assert_eq!(contents, "{}");
            }
        }
    }

    #[test]
    fn test_ensure_keeps_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = MemoryFiles::new(dir.path().to_path_buf());
        std::fs::write(files.path(Collection::ErrorLog), "[1]").unwrap();
        files.ensure().unwrap();
        assert_eq!(std::fs::read_to_string(files.path(Collection::ErrorLog)).unwrap(), "[1]");
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = MemoryFiles::new(dir.path().to_path_buf());
        let map: BTreeMap<String, u32> = files.load(Collection::AgentPerformance);
        assert!(map.is_empty());
    }

    fn corrupt_copies(dir: &Path) -> Vec<String> {
        let mut copies: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("venue-profiles.json.corrupt-"))
            .map(|name| std::fs::read_to_string(dir.join(name)).unwrap())
            .collect();
        copies.sort();
        copies
    }

    #[test]
    fn test_plain_load_leaves_corrupt_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let files = MemoryFiles::new(dir.path().to_path_buf());
        let path = files.path(Collection::VenueProfiles);
        std::fs::write(&path, "{ not json").unwrap();

        let map: BTreeMap<String, u32> = files.load(Collection::VenueProfiles);
        assert!(map.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
        assert!(corrupt_copies(dir.path()).is_empty());
    }

    #[test]
    fn test_corrupt_file_moved_aside_before_update() {
        let dir = tempfile::tempdir().unwrap();
        let files = MemoryFiles::new(dir.path().to_path_buf());
        let path = files.path(Collection::VenueProfiles);
        std::fs::write(&path, "{ not json").unwrap();

        let map: BTreeMap<String, u32> = files.load_for_update(Collection::VenueProfiles).unwrap();
        assert!(map.is_empty());
        assert!(!path.exists());
        assert_eq!(corrupt_copies(dir.path()), vec!["{ not json"]);
    }

    #[test]
    fn test_repeated_corruption_keeps_every_copy() {
        let dir = tempfile::tempdir().unwrap();
        let files = MemoryFiles::new(dir.path().to_path_buf());
        let path = files.path(Collection::VenueProfiles);

        std::fs::write(&path, "first").unwrap();
        let _: BTreeMap<String, u32> = files.load_for_update(Collection::VenueProfiles).unwrap();
        std::fs::write(&path, "second").unwrap();
        let _: BTreeMap<String, u32> = files.load_for_update(Collection::VenueProfiles).unwrap();

        assert_eq!(corrupt_copies(dir.path()), vec!["first", "second"]);
    }

    #[test]
    fn test_aside_path_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error-log.json");
        let at = Utc::now();
        let first = aside_path(&path, at);
        std::fs::write(&first, "x").unwrap();
        let second = aside_path(&path, at);
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("-1"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let files = MemoryFiles::new(dir.path().to_path_buf());
        let mut map = BTreeMap::new();
        map.insert("perplexity".to_string(), 3u32);
        files.save(Collection::AgentPerformance, &map).unwrap();

        let loaded: BTreeMap<String, u32> = files.load(Collection::AgentPerformance);
        assert_eq!(loaded, map);
    }

    #[test]
    fn test_collection_display() {
        assert_eq!(Collection::ScrapingDecisions.to_string(), "scraping-decisions");
    }
}
