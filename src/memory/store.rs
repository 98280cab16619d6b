//! Memory store - the shared learning state of the scraper agents
//!
//! Every write is load-modify-save of one whole collection. A mutex
//! serializes those cycles within the process; separate processes are not
//! coordinated (see `files`).

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use super::error::Result;
use super::files::{Collection, MemoryFiles};
use super::model::*;
use crate::insights::{
    analysis, prune_insights, AgentComparison, DecisionPattern, ErrorPattern, Insight, InsightSources,
    INSIGHT_RETENTION_DAYS,
};
use crate::types::{Venue, VenueId};

/// File-backed memory store rooted at one directory
pub struct MemoryStore {
    files: MemoryFiles,
    write_lock: Mutex<()>,
    insight_retention: chrono::Duration,
}

impl MemoryStore {
    /// Open (and seed if needed) the memory directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let files = MemoryFiles::new(dir.into());
        files.ensure()?;
        debug!("Memory store opened at {}", files.dir().display());
        Ok(Self {
            files,
            write_lock: Mutex::new(()),
            insight_retention: chrono::Duration::days(INSIGHT_RETENTION_DAYS),
        })
    }

    pub fn with_insight_retention_days(mut self, days: i64) -> Self {
        self.insight_retention = chrono::Duration::days(days);
        self
    }

    pub fn dir(&self) -> &Path {
        self.files.dir()
    }

    fn read<T: DeserializeOwned + Default>(&self, collection: Collection) -> T {
        self.files.load(collection)
    }

    fn update<T, R, F>(&self, collection: Collection, mutate: F) -> Result<R>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T) -> R,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut value: T = self.files.load_for_update(collection)?;
        let result = mutate(&mut value);
        self.files.save(collection, &value)?;
        Ok(result)
    }

    // --- Venue learning ---

    /// Merge newly observed events into the venue's learned patterns
    pub fn record_venue_learning(
        &self,
        venue_id: VenueId,
        venue: &Venue,
        new_events: &[crate::types::ScrapedEvent],
        agent: &str,
    ) -> Result<VenueProfile> {
        let profile = self.update(Collection::VenueProfiles, |profiles: &mut VenueProfiles| {
            let profile = profiles
                .entry(venue_id)
                .or_insert_with(|| VenueProfile::new(venue_id, venue));

            for event in new_events {
                profile.patterns.event_titles.push(event.title.clone());
                if let Some(time) = &event.time {
                    profile.patterns.event_times.push(time.clone());
                }
                if let Some(category) = &event.category {
                    profile.patterns.event_categories.push(category.clone());
                }
                if let Some(description) = &event.description {
                    profile
                        .patterns
                        .event_description_patterns
                        .push(description_pattern(description));
                }
            }

            profile.learning_history.push(LearningEvent {
                timestamp: Utc::now(),
                agent: agent.to_string(),
                events_learned: new_events.len(),
            });
            profile.successful_scrapes_count += 1;
            profile.last_learning_from = Some(agent.to_string());
            profile.clone()
        })?;

        info!("Learned venue profile for {} from {}", venue.name, agent);
        Ok(profile)
    }

    pub fn get_venue_profile(&self, venue_id: VenueId) -> Option<VenueProfile> {
        let mut profiles: VenueProfiles = self.read(Collection::VenueProfiles);
        profiles.remove(&venue_id)
    }

    pub fn all_venue_profiles(&self) -> VenueProfiles {
        self.read(Collection::VenueProfiles)
    }

    /// Active venues from the database, highest priority first, each with
    /// its learned profile when one exists
    pub async fn active_venue_profiles(
        &self,
        catalog: &super::sqlite::VenueCatalog,
    ) -> Result<Vec<(Venue, Option<VenueProfile>)>> {
        let venues = catalog.active_venues().await?;
        let mut profiles = self.all_venue_profiles();
        debug!("{} active venues, {} learned profiles", venues.len(), profiles.len());
        Ok(venues
            .into_iter()
            .map(|venue| {
                let profile = profiles.remove(&venue.id);
                (venue, profile)
            })
            .collect())
    }

    // --- Prompts ---

    pub fn record_prompt(
        &self,
        venue_id: VenueId,
        agent: &str,
        prompt: &str,
        quality: f64,
        event_count: u64,
    ) -> Result<PromptTemplate> {
        self.update(Collection::PromptTemplates, |templates: &mut PromptTemplates| {
            let template = templates
                .entry(prompt_key(venue_id, agent))
                .or_insert_with(|| PromptTemplate::new(venue_id, agent));
            template.prompts.push(PromptRecord {
                timestamp: Utc::now(),
                prompt: prompt.to_string(),
                quality,
                event_count,
            });
            template.recompute();
            template.clone()
        })
    }

    pub fn get_best_prompt(&self, venue_id: VenueId, agent: &str) -> Option<String> {
        let mut templates: PromptTemplates = self.read(Collection::PromptTemplates);
        templates
            .remove(&prompt_key(venue_id, agent))
            .and_then(|t| t.best_prompt)
    }

    /// Best recorded prompt, or one built from the venue profile and recent
    /// extraction examples when nothing has been recorded yet
    pub fn learned_prompt(&self, venue: &Venue, agent: &str, example_limit: usize) -> String {
        if let Some(prompt) = self.get_best_prompt(venue.id, agent) {
            debug!("Using recorded best prompt for venue {}", venue.id);
            return prompt;
        }
        let profile = self.get_venue_profile(venue.id);
        let examples = self.get_extraction_examples(venue.id, example_limit);
        crate::prompt::build_learned_prompt(venue, profile.as_ref(), &examples)
    }

    // --- Extraction patterns ---

    pub fn record_extraction_pattern(
        &self,
        venue_id: VenueId,
        descriptor: Value,
        extracted: Vec<Value>,
        agent: &str,
    ) -> Result<ExtractionPatternSet> {
        self.update(Collection::ExtractionPatterns, |patterns: &mut ExtractionPatterns| {
            let set = patterns
                .entry(venue_id)
                .or_insert_with(|| ExtractionPatternSet::new(venue_id));
            set.patterns.push(PatternAttempt {
                timestamp: Utc::now(),
                agent: agent.to_string(),
                html_pattern: descriptor,
                success_count: extracted.len(),
                data_extracted: extracted,
            });
            set.total_attempts += 1;
            set.recompute();
            set.clone()
        })
    }

    pub fn get_extraction_patterns(&self, venue_id: VenueId) -> Vec<PatternAttempt> {
        let patterns: ExtractionPatterns = self.read(Collection::ExtractionPatterns);
        patterns
            .get(&venue_id)
            .map(|set| set.patterns.to_vec())
            .unwrap_or_default()
    }

    // --- Decisions ---

    pub fn record_decision(&self, decision: Decision) -> Result<()> {
        debug!("Decision {} for venue {}: {}", decision.agent, decision.venue_id, decision.outcome);
        self.update(Collection::ScrapingDecisions, |log: &mut DecisionLog| {
            log.push(decision);
        })
    }

    pub fn decisions(&self) -> DecisionLog {
        self.read(Collection::ScrapingDecisions)
    }

    pub fn analyze_decision_patterns(&self) -> Option<std::collections::BTreeMap<String, DecisionPattern>> {
        let log = self.decisions();
        analysis::decision_patterns(log.iter())
    }

    // --- Agent performance ---

    pub fn record_agent_performance(&self, agent: &str, metrics: &RunMetrics) -> Result<AgentPerformance> {
        let performance = self.update(Collection::AgentPerformance, |map: &mut AgentPerformanceMap| {
            let record = map
                .entry(agent.to_string())
                .or_insert_with(|| AgentPerformance::new(agent));
            record.record_run(metrics, Utc::now());
            record.clone()
        })?;
        info!(
            "Recorded run for {}: {} events, {} duplicates, {} errors",
            agent, metrics.events_scraped, metrics.duplicates, metrics.errors
        );
        Ok(performance)
    }

    pub fn agent_performance(&self) -> AgentPerformanceMap {
        self.read(Collection::AgentPerformance)
    }

    pub fn agent_comparison(&self) -> std::collections::BTreeMap<String, AgentComparison> {
        analysis::agent_comparison(&self.agent_performance())
    }

    // --- Errors ---

    pub fn record_error(&self, error: ErrorRecord) -> Result<()> {
        debug!("Recording {} error from {}", error.error_type, error.agent);
        self.update(Collection::ErrorLog, |log: &mut ErrorLog| {
            log.push(error);
        })
    }

    pub fn errors(&self) -> ErrorLog {
        self.read(Collection::ErrorLog)
    }

    pub fn error_patterns(&self) -> std::collections::BTreeMap<String, ErrorPattern> {
        let log = self.errors();
        analysis::error_patterns(log.iter())
    }

    // --- Successful extractions ---

    pub fn record_successful_extraction(
        &self,
        venue_id: VenueId,
        venue_name: &str,
        event: Value,
        agent: &str,
    ) -> Result<()> {
        self.update(Collection::SuccessfulExtractions, |log: &mut ExtractionLog| {
            log.push(SuccessfulExtraction {
                timestamp: Utc::now(),
                agent: agent.to_string(),
                venue_id,
                venue_name: Some(venue_name.to_string()),
                event,
            });
        })
    }

    /// The most recent `limit` events extracted for a venue, oldest first
    pub fn get_extraction_examples(&self, venue_id: VenueId, limit: usize) -> Vec<Value> {
        let log: ExtractionLog = self.read(Collection::SuccessfulExtractions);
        let matching: Vec<&SuccessfulExtraction> = log.iter().filter(|e| e.venue_id == venue_id).collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).map(|e| e.event.clone()).collect()
    }

    // --- Insights ---

    pub fn generate_insights(&self) -> Result<Insight> {
        self.generate_insights_at(Utc::now())
    }

    /// Compute an insight as of `now`, append it to the insight log and drop
    /// logged insights older than the retention window
    pub fn generate_insights_at(&self, now: DateTime<Utc>) -> Result<Insight> {
        let profiles: VenueProfiles = self.read(Collection::VenueProfiles);
        let performance: AgentPerformanceMap = self.read(Collection::AgentPerformance);
        let errors: ErrorLog = self.read(Collection::ErrorLog);
        let decisions: DecisionLog = self.read(Collection::ScrapingDecisions);

        let insight = Insight::generate(
            &InsightSources {
                profiles: &profiles,
                performance: &performance,
                errors: &errors,
                decisions: &decisions,
            },
            now,
        );

        let retention = self.insight_retention;
        let snapshot = insight.clone();
        let retained = self.update(Collection::LearningInsights, |log: &mut Vec<Insight>| {
            log.push(snapshot);
            prune_insights(log, now, retention);
            log.len()
        })?;

        info!("Generated learning insights ({} retained)", retained);
        Ok(insight)
    }

    pub fn insight_log(&self) -> Vec<Insight> {
        self.read(Collection::LearningInsights)
    }

    /// Generate insights and back them up to the snapshot table
    pub async fn sync_to_database(&self, snapshots: &super::sqlite::SnapshotStore) -> Result<Insight> {
        let insight = self.generate_insights()?;
        let json = serde_json::to_string(&insight)?;
        snapshots.save_snapshot(super::sqlite::LEARNING_INSIGHTS_SNAPSHOT, &json).await?;
        info!("Synced learning insights to database");
        Ok(insight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Outcome, ScrapedEvent};

    fn store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path().join("memory")).unwrap();
        (dir, store)
    }

    fn venue(id: VenueId) -> Venue {
        Venue::new(id, &format!("Venue {}", id)).with_city("Beaumont").with_category("Music")
    }

    #[test]
    fn test_venue_learning_scenario() {
        let (_dir, store) = store();
        let events = vec![
            ScrapedEvent::new("Zydeco Night").with_time("8:00 PM"),
            ScrapedEvent::new("Blues Jam").with_category("Music"),
        ];
        store.record_venue_learning(7, &venue(7), &events, "perplexity").unwrap();

        let profile = store.get_venue_profile(7).unwrap();
        assert_eq!(profile.successful_scrapes_count, 1);
        assert_eq!(profile.patterns.event_titles.to_vec(), vec!["Zydeco Night", "Blues Jam"]);
        assert_eq!(profile.patterns.event_times.to_vec(), vec!["8:00 PM"]);
        assert_eq!(profile.last_learning_from.as_deref(), Some("perplexity"));
        assert_eq!(profile.learning_history.last().unwrap().events_learned, 2);
        assert!(store.get_venue_profile(8).is_none());
    }

    #[test]
    fn test_venue_patterns_keep_last_ten() {
        let (_dir, store) = store();
        for batch in 0..3 {
            let events: Vec<_> = (0..5)
                .map(|i| ScrapedEvent::new(&format!("Event {}-{}", batch, i)).with_time("7 PM"))
                .collect();
            store.record_venue_learning(1, &venue(1), &events, "ollama-local").unwrap();
        }
        let profile = store.get_venue_profile(1).unwrap();
        assert_eq!(profile.successful_scrapes_count, 3);
        assert_eq!(profile.patterns.event_titles.len(), 10);
        assert_eq!(profile.patterns.event_titles.iter().next().unwrap(), "Event 1-0");
        assert_eq!(profile.patterns.event_times.len(), 10);
    }

    #[test]
    fn test_best_prompt_over_retained_window() {
        let (_dir, store) = store();
        store.record_prompt(1, "perplexity", "great", 0.99, 4).unwrap();
        for i in 0..5 {
            store.record_prompt(1, "perplexity", &format!("p{}", i), 0.1 * i as f64, 1).unwrap();
        }
        // "great" has been evicted; best among the retained five is p4
        assert_eq!(store.get_best_prompt(1, "perplexity").as_deref(), Some("p4"));
        assert!(store.get_best_prompt(1, "ollama-local").is_none());
    }

    #[test]
    fn test_extraction_success_rate_uses_retained_attempts() {
        let (_dir, store) = store();
        for _ in 0..5 {
            store.record_extraction_pattern(3, serde_json::json!(".event-card"), vec![], "perplexity").unwrap();
        }
        let mut last = None;
        for _ in 0..10 {
            last = Some(
                store
                    .record_extraction_pattern(3, serde_json::json!(".event-card"), vec![serde_json::json!({"title": "x"})], "perplexity")
                    .unwrap(),
            );
        }
        let set = last.unwrap();
        assert_eq!(set.total_attempts, 15);
        assert_eq!(set.patterns.len(), 10);
        assert_eq!(set.success_rate, 1.0);
        assert_eq!(store.get_extraction_patterns(3).len(), 10);
    }

    #[test]
    fn test_agent_totals_accumulate_beyond_window() {
        let (_dir, store) = store();
        for i in 0..35u64 {
            let metrics = RunMetrics {
                events_scraped: 2,
                duplicates: 1,
                errors: 1,
                success_rate: if i < 5 { 0.0 } else { 1.0 },
                execution_time: 1000,
                api_cost: None,
            };
            store.record_agent_performance("perplexity", &metrics).unwrap();
        }
        let perf = store.agent_performance().remove("perplexity").unwrap();
        assert_eq!(perf.runs.len(), AGENT_RUN_CAP);
        assert_eq!(perf.total_events_scraped, 70);
        assert_eq!(perf.total_duplicates_detected, 35);
        assert_eq!(perf.total_errors_handled, 35);
        assert_eq!(perf.average_success_rate, 1.0);
    }

    #[test]
    fn test_extraction_examples_most_recent_for_venue() {
        let (_dir, store) = store();
        for i in 0..6 {
            store
                .record_successful_extraction(2, "Ford Park", serde_json::json!({"title": format!("e{}", i)}), "perplexity")
                .unwrap();
            store
                .record_successful_extraction(5, "Other", serde_json::json!({"title": "other"}), "perplexity")
                .unwrap();
        }
        let examples = store.get_extraction_examples(2, 3);
        let titles: Vec<_> = examples.iter().map(|e| e["title"].as_str().unwrap().to_string()).collect();
        assert_eq!(titles, vec!["e3", "e4", "e5"]);
        assert!(store.get_extraction_examples(99, 5).is_empty());
    }

    #[test]
    fn test_insights_prune_old_entries() {
        let (_dir, store) = store();
        let now = Utc::now();
        store.generate_insights_at(now - chrono::Duration::days(100)).unwrap();
        store.generate_insights_at(now - chrono::Duration::days(30)).unwrap();
        assert_eq!(store.insight_log().len(), 2);

        store.generate_insights_at(now).unwrap();
        let log = store.insight_log();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|i| i.timestamp > now - chrono::Duration::days(90)));
    }

    #[test]
    fn test_focus_area_scenario() {
        let (_dir, store) = store();
        for _ in 0..12 {
            store
                .record_decision(Decision::new("perplexity", 4, Outcome::Failed).with_venue_name("Beaumont Civic Center"))
                .unwrap();
        }
        for id in 10..21 {
            store.record_decision(Decision::new("perplexity", id, Outcome::Success)).unwrap();
        }
        let insight = store.generate_insights().unwrap();
        assert_eq!(insight.recommended_focus_areas[0].venue_id, Some(4));
        assert_eq!(insight.recommended_focus_areas[0].count, 12);

        let patterns = store.analyze_decision_patterns().unwrap();
        assert_eq!(patterns["perplexity"].failed, 12);
        assert_eq!(patterns["perplexity"].successful, 11);
    }

    #[test]
    fn test_error_log_and_patterns() {
        let (_dir, store) = store();
        store
            .record_error(ErrorRecord::new("perplexity", "scraping_error", "timeout").for_venue(1, "Ford Park").with_resolution("logged"))
            .unwrap();
        store.record_error(ErrorRecord::new("perplexity", "scraping_error", "503")).unwrap();
        assert_eq!(store.errors().len(), 2);
        let patterns = store.error_patterns();
        assert_eq!(patterns["scraping_error"].count, 2);
        assert_eq!(patterns["scraping_error"].resolutions, vec!["logged"]);
    }

    #[test]
    fn test_lookup_leaves_corrupt_file_until_next_write() {
        let (_dir, store) = store();
        let path = store.dir().join("venue-profiles.json");
        std::fs::write(&path, "{\"7\": ").unwrap();

        assert!(store.get_venue_profile(7).is_none());
        assert!(store.all_venue_profiles().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"7\": ");

        store.record_venue_learning(7, &venue(7), &[ScrapedEvent::new("Open Mic")], "perplexity").unwrap();
        assert_eq!(store.get_venue_profile(7).unwrap().successful_scrapes_count, 1);
        let moved = std::fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("venue-profiles.json.corrupt-"));
        assert!(moved);
    }

    #[tokio::test]
    async fn test_active_venue_profiles_pairs_learned_state() {
        let (_dir, store) = store();
        let snapshots = crate::memory::SnapshotStore::in_memory().unwrap();
        snapshots
            .execute_batch(
                r#"
                CREATE TABLE venues (
                    id INTEGER PRIMARY KEY, name TEXT NOT NULL, city TEXT, category TEXT,
                    website TEXT, facebook_url TEXT, description TEXT,
                    priority INTEGER DEFAULT 0, is_active INTEGER DEFAULT 1
                );
                INSERT INTO venues (id, name, priority) VALUES (1, 'Ford Park', 2);
                INSERT INTO venues (id, name, priority) VALUES (2, 'Jefferson Theatre', 8);
                INSERT INTO venues (id, name, priority, is_active) VALUES (3, 'Closed Hall', 9, 0);
                "#,
            )
            .await
            .unwrap();
        store.record_venue_learning(2, &venue(2), &[ScrapedEvent::new("Gala")], "perplexity").unwrap();

        let plan = store.active_venue_profiles(&snapshots.venues()).await.unwrap();
        let ids: Vec<_> = plan.iter().map(|(v, _)| v.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(plan[0].1.as_ref().unwrap().successful_scrapes_count, 1);
        assert!(plan[1].1.is_none());
    }

    #[test]
    fn test_write_failure_is_reported() {
        let (dir, store) = store();
        std::fs::remove_dir_all(dir.path().join("memory")).unwrap();
        let result = store.record_decision(Decision::new("perplexity", 1, Outcome::Success));
        assert!(result.is_err());
    }

    #[test]
    fn test_concurrent_threads_do_not_lose_updates() {
        let (_dir, store) = store();
        let store = std::sync::Arc::new(store);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        store.record_decision(Decision::new("perplexity", t * 100 + i, Outcome::Success)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.decisions().len(), 40);
    }
}
