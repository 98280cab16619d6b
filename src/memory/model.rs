//! Entity shapes stored in the memory collections
//!
//! Field names serialize in camelCase to stay compatible with the existing
//! JSON documents in the memory directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::bounded::BoundedLog;
use crate::types::{Outcome, VenueId};

pub const VENUE_PATTERN_CAP: usize = 10;
pub const LEARNING_HISTORY_CAP: usize = 100;
pub const PROMPT_HISTORY_CAP: usize = 5;
pub const EXTRACTION_PATTERN_CAP: usize = 10;
pub const DECISION_LOG_CAP: usize = 10_000;
pub const AGENT_RUN_CAP: usize = 30;
pub const ERROR_LOG_CAP: usize = 1_000;
pub const EXTRACTION_LOG_CAP: usize = 5_000;

/// Maximum length of a stored description pattern before it is elided
const DESCRIPTION_PATTERN_LEN: usize = 50;

// --- Venue profiles ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningEvent {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub events_learned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenuePatterns {
    #[serde(default)]
    pub event_titles: BoundedLog<String, VENUE_PATTERN_CAP>,
    #[serde(default)]
    pub event_times: BoundedLog<String, VENUE_PATTERN_CAP>,
    #[serde(default)]
    pub event_categories: BoundedLog<String, VENUE_PATTERN_CAP>,
    #[serde(default)]
    pub event_description_patterns: BoundedLog<String, VENUE_PATTERN_CAP>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueProfile {
    pub venue_id: VenueId,
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub learning_history: BoundedLog<LearningEvent, LEARNING_HISTORY_CAP>,
    #[serde(default)]
    pub patterns: VenuePatterns,
    #[serde(default)]
    pub successful_scrapes_count: u64,
    #[serde(default)]
    pub last_learning_from: Option<String>,
}

impl VenueProfile {
    pub fn new(venue_id: VenueId, meta: &crate::types::Venue) -> Self {
        Self {
            venue_id,
            name: meta.name.clone(),
            city: meta.city.clone(),
            category: meta.category.clone(),
            website: meta.website.clone(),
            learning_history: BoundedLog::new(),
            patterns: VenuePatterns::default(),
            successful_scrapes_count: 0,
            last_learning_from: None,
        }
    }
}

/// Shorten a description to a reusable pattern snippet
pub fn description_pattern(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(DESCRIPTION_PATTERN_LEN).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

// --- Prompt templates ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    #[serde(default, deserialize_with = "deserialize_quality")]
    pub quality: f64,
    #[serde(default)]
    pub event_count: u64,
}

/// Older writers stored quality as `{ "eventCount": N }`; that reads as N.
fn deserialize_quality<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        Value::Object(map) => Ok(map.get("eventCount").and_then(Value::as_f64).unwrap_or(0.0)),
        _ => Ok(0.0),
    }
}

/// A non-finite average was written as `null`
fn deserialize_average<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<f64> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or(0.0))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    pub venue_id: VenueId,
    pub agent: String,
    #[serde(default)]
    pub prompts: BoundedLog<PromptRecord, PROMPT_HISTORY_CAP>,
    #[serde(default)]
    pub best_prompt: Option<String>,
    #[serde(default, deserialize_with = "deserialize_average")]
    pub average_quality: f64,
}

impl PromptTemplate {
    pub fn new(venue_id: VenueId, agent: &str) -> Self {
        Self {
            venue_id,
            agent: agent.to_string(),
            prompts: BoundedLog::new(),
            best_prompt: None,
            average_quality: 0.0,
        }
    }

    /// Recompute `best_prompt` and `average_quality` from the retained prompts.
    /// Ties keep the earliest maximum.
    pub fn recompute(&mut self) {
        let mut best: Option<&PromptRecord> = None;
        for record in self.prompts.iter() {
            match best {
                Some(b) if record.quality <= b.quality => {}
                _ => best = Some(record),
            }
        }
        self.best_prompt = best.map(|r| r.prompt.clone());
        self.average_quality = if self.prompts.is_empty() {
            0.0
        } else {
            self.prompts.iter().map(|r| r.quality).sum::<f64>() / self.prompts.len() as f64
        };
    }
}

/// Key of a prompt template in `prompt-templates.json`
pub fn prompt_key(venue_id: VenueId, agent: &str) -> String {
    format!("{}_{}", venue_id, agent)
}

// --- Extraction patterns ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternAttempt {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub html_pattern: Value,
    #[serde(default)]
    pub data_extracted: Vec<Value>,
    #[serde(default)]
    pub success_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionPatternSet {
    pub venue_id: VenueId,
    #[serde(default)]
    pub patterns: BoundedLog<PatternAttempt, EXTRACTION_PATTERN_CAP>,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub total_attempts: u64,
}

impl ExtractionPatternSet {
    pub fn new(venue_id: VenueId) -> Self {
        Self {
            venue_id,
            patterns: BoundedLog::new(),
            success_rate: 0.0,
            total_attempts: 0,
        }
    }

    /// Fraction of retained attempts that yielded at least one item
    pub fn recompute(&mut self) {
        let retained = self.patterns.len();
        self.success_rate = if retained == 0 {
            0.0
        } else {
            let yielded = self.patterns.iter().filter(|p| p.success_count > 0).count();
            yielded as f64 / retained as f64
        };
    }
}

// --- Decisions ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub venue_id: VenueId,
    #[serde(default)]
    pub venue_name: Option<String>,
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub outcome: Outcome,
    #[serde(default)]
    pub events_found: u64,
    #[serde(default)]
    pub duplicates_skipped: u64,
}

impl Decision {
    pub fn new(agent: &str, venue_id: VenueId, outcome: Outcome) -> Self {
        Self {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            venue_id,
            venue_name: None,
            decision: match outcome {
                Outcome::Success => "extract_and_save".to_string(),
                Outcome::Failed => "failed_to_extract".to_string(),
            },
            reason: None,
            outcome,
            events_found: 0,
            duplicates_skipped: 0,
        }
    }

    pub fn with_venue_name(mut self, name: &str) -> Self {
        self.venue_name = Some(name.to_string());
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn with_events_found(mut self, count: u64) -> Self {
        self.events_found = count;
        self
    }

    pub fn with_duplicates_skipped(mut self, count: u64) -> Self {
        self.duplicates_skipped = count;
        self
    }
}

pub type DecisionLog = BoundedLog<Decision, DECISION_LOG_CAP>;

// --- Agent performance ---

/// Metrics reported by an agent at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    #[serde(default)]
    pub events_scraped: u64,
    #[serde(default)]
    pub duplicates: u64,
    #[serde(default)]
    pub errors: u64,
    #[serde(default)]
    pub success_rate: f64,
    /// Milliseconds
    #[serde(default)]
    pub execution_time: u64,
    #[serde(default)]
    pub api_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRun {
    pub timestamp: DateTime<Utc>,
    pub events_scraped: u64,
    pub duplicates: u64,
    pub errors: u64,
    pub success_rate: f64,
    pub execution_time: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cost: Option<f64>,
    #[serde(default)]
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPerformance {
    pub name: String,
    #[serde(default)]
    pub runs: BoundedLog<AgentRun, AGENT_RUN_CAP>,
    #[serde(default)]
    pub total_events_scraped: u64,
    #[serde(default)]
    pub total_duplicates_detected: u64,
    #[serde(default)]
    pub total_errors_handled: u64,
    #[serde(default)]
    pub average_success_rate: f64,
    #[serde(default)]
    pub cost_metrics: CostMetrics,
}

impl AgentPerformance {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            runs: BoundedLog::new(),
            total_events_scraped: 0,
            total_duplicates_detected: 0,
            total_errors_handled: 0,
            average_success_rate: 0.0,
            cost_metrics: CostMetrics::default(),
        }
    }

    pub fn record_run(&mut self, metrics: &RunMetrics, at: DateTime<Utc>) {
        self.runs.push(AgentRun {
            timestamp: at,
            events_scraped: metrics.events_scraped,
            duplicates: metrics.duplicates,
            errors: metrics.errors,
            success_rate: metrics.success_rate,
            execution_time: metrics.execution_time,
        });

        self.total_events_scraped += metrics.events_scraped;
        self.total_duplicates_detected += metrics.duplicates;
        self.total_errors_handled += metrics.errors;
        self.average_success_rate =
            self.runs.iter().map(|r| r.success_rate).sum::<f64>() / self.runs.len() as f64;

        if let Some(cost) = metrics.api_cost {
            self.cost_metrics.last_cost = Some(cost);
            self.cost_metrics.total_cost += cost;
        }
    }
}

// --- Errors and extractions ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    #[serde(default)]
    pub venue_id: Option<VenueId>,
    #[serde(default)]
    pub venue_name: Option<String>,
    pub error_type: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub tried: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
}

impl ErrorRecord {
    pub fn new(agent: &str, error_type: &str, error_message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            venue_id: None,
            venue_name: None,
            error_type: error_type.to_string(),
            error_message: error_message.to_string(),
            tried: None,
            resolution: None,
        }
    }

    pub fn for_venue(mut self, venue_id: VenueId, venue_name: &str) -> Self {
        self.venue_id = Some(venue_id);
        self.venue_name = Some(venue_name.to_string());
        self
    }

    pub fn with_tried(mut self, tried: &str) -> Self {
        self.tried = Some(tried.to_string());
        self
    }

    pub fn with_resolution(mut self, resolution: &str) -> Self {
        self.resolution = Some(resolution.to_string());
        self
    }
}

pub type ErrorLog = BoundedLog<ErrorRecord, ERROR_LOG_CAP>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessfulExtraction {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub venue_id: VenueId,
    #[serde(default)]
    pub venue_name: Option<String>,
    pub event: Value,
}

pub type ExtractionLog = BoundedLog<SuccessfulExtraction, EXTRACTION_LOG_CAP>;

pub type VenueProfiles = BTreeMap<VenueId, VenueProfile>;
pub type PromptTemplates = BTreeMap<String, PromptTemplate>;
pub type ExtractionPatterns = BTreeMap<VenueId, ExtractionPatternSet>;
pub type AgentPerformanceMap = BTreeMap<String, AgentPerformance>;
