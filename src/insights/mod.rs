//! Learning insights
//!
//! A point-in-time summary derived from the memory collections: which venues
//! the agents learn from most, how the agents compare, which errors recur,
//! and which venues keep failing. Insights are pure functions of the store's
//! contents and are recomputed on demand.

pub mod analysis;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::memory::model::{AgentPerformanceMap, DecisionLog, ErrorLog, VenueProfiles};
use crate::types::VenueId;

/// Default age after which stored insights are pruned
pub const INSIGHT_RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueRank {
    /// Absent in insights logged before venue ids were recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<VenueId>,
    pub name: String,
    pub learns: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentComparison {
    pub success_rate: f64,
    pub events_scraped: u64,
    pub duplicate_detection_rate: f64,
    /// Total errors the agent has handled
    pub error_handling_rate: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPattern {
    pub count: u64,
    #[serde(default)]
    pub resolutions: Vec<String>,
    #[serde(default)]
    pub last_occurrence: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusArea {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<VenueId>,
    #[serde(default)]
    pub name: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionPattern {
    pub successful: u64,
    pub failed: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub timestamp: DateTime<Utc>,
    pub top_venues_for_learning: Vec<VenueRank>,
    pub agent_comparison: BTreeMap<String, AgentComparison>,
    pub common_errors: BTreeMap<String, ErrorPattern>,
    pub best_performing_venues: Vec<String>,
    pub recommended_focus_areas: Vec<FocusArea>,
}

/// Borrowed view of the collections an insight is computed from
pub struct InsightSources<'a> {
    pub profiles: &'a VenueProfiles,
    pub performance: &'a AgentPerformanceMap,
    pub errors: &'a ErrorLog,
    pub decisions: &'a DecisionLog,
}

impl Insight {
    pub fn generate(sources: &InsightSources<'_>, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at,
            top_venues_for_learning: analysis::top_venues_for_learning(sources.profiles),
            agent_comparison: analysis::agent_comparison(sources.performance),
            common_errors: analysis::error_patterns(sources.errors.iter()),
            best_performing_venues: analysis::best_performing_venues(sources.profiles),
            recommended_focus_areas: analysis::recommended_focus_areas(sources.decisions.iter()),
        }
    }

    /// One-paragraph text summary for terminal output
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let venues: Vec<&str> = self.top_venues_for_learning.iter().map(|v| v.name.as_str()).collect();
        out.push_str(&format!(
            "Top venues for learning: {}\n",
            if venues.is_empty() { "none yet".to_string() } else { venues.join(", ") }
        ));
        for (agent, comparison) in &self.agent_comparison {
            out.push_str(&format!(
                "  {}: {:.1}% success, {} events, {:.1}% duplicates, {} errors\n",
                agent,
                comparison.success_rate * 100.0,
                comparison.events_scraped,
                comparison.duplicate_detection_rate * 100.0,
                comparison.error_handling_rate
            ));
        }
        if !self.common_errors.is_empty() {
            let errors: Vec<String> = self
                .common_errors
                .iter()
                .map(|(kind, p)| format!("{} ({})", kind, p.count))
                .collect();
            out.push_str(&format!("Common errors: {}\n", errors.join(", ")));
        }
        if !self.recommended_focus_areas.is_empty() {
            let areas: Vec<String> = self
                .recommended_focus_areas
                .iter()
                .map(|a| format!("{} ({} failures)", a.name.as_deref().unwrap_or("unknown"), a.count))
                .collect();
            out.push_str(&format!("Focus areas: {}\n", areas.join(", ")));
        }
        out
    }
}

/// Drop insights older than `retention` before `now`. Idempotent.
pub fn prune_insights(log: &mut Vec<Insight>, now: DateTime<Utc>, retention: chrono::Duration) {
    analysis::prune_by_age(log, now, retention, |insight| insight.timestamp);
}
