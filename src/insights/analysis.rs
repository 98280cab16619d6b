//! Aggregations over the raw memory collections

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

use super::{AgentComparison, DecisionPattern, ErrorPattern, FocusArea, VenueRank};
use crate::memory::model::{AgentPerformanceMap, Decision, ErrorRecord, VenueProfiles};
use crate::types::{Outcome, VenueId};

pub const TOP_VENUES: usize = 10;
pub const BEST_VENUES: usize = 10;
pub const BEST_VENUE_MIN_SCRAPES: u64 = 3;
pub const ERROR_WINDOW: usize = 200;
pub const FOCUS_DECISION_WINDOW: usize = 300;
pub const FOCUS_AREAS: usize = 5;
pub const DECISION_PATTERN_WINDOW: usize = 500;

/// Venues sorted by successful scrape count, highest first.
/// Ties keep ascending venue id order.
fn ranked_venues(profiles: &VenueProfiles) -> Vec<(&VenueId, &crate::memory::model::VenueProfile)> {
    let mut ranked: Vec<_> = profiles.iter().collect();
    ranked.sort_by(|a, b| b.1.successful_scrapes_count.cmp(&a.1.successful_scrapes_count));
    ranked
}

pub fn top_venues_for_learning(profiles: &VenueProfiles) -> Vec<VenueRank> {
    ranked_venues(profiles)
        .into_iter()
        .take(TOP_VENUES)
        .map(|(id, profile)| VenueRank {
            venue_id: Some(*id),
            name: profile.name.clone(),
            learns: profile.successful_scrapes_count,
        })
        .collect()
}

pub fn best_performing_venues(profiles: &VenueProfiles) -> Vec<String> {
    ranked_venues(profiles)
        .into_iter()
        .filter(|(_, p)| p.successful_scrapes_count >= BEST_VENUE_MIN_SCRAPES)
        .take(BEST_VENUES)
        .map(|(_, p)| p.name.clone())
        .collect()
}

pub fn agent_comparison(performance: &AgentPerformanceMap) -> BTreeMap<String, AgentComparison> {
    performance
        .iter()
        .map(|(agent, data)| {
            let seen = data.total_events_scraped + data.total_duplicates_detected;
            let denominator = if seen == 0 { 1 } else { seen };
            (
                agent.clone(),
                AgentComparison {
                    success_rate: data.average_success_rate,
                    events_scraped: data.total_events_scraped,
                    duplicate_detection_rate: data.total_duplicates_detected as f64 / denominator as f64,
                    error_handling_rate: data.total_errors_handled,
                },
            )
        })
        .collect()
}

/// Error-type frequency over the most recent `ERROR_WINDOW` errors
pub fn error_patterns<'a, I>(errors: I) -> BTreeMap<String, ErrorPattern>
where
    I: DoubleEndedIterator<Item = &'a ErrorRecord> + ExactSizeIterator,
{
    let skip = errors.len().saturating_sub(ERROR_WINDOW);
    let mut patterns: BTreeMap<String, ErrorPattern> = BTreeMap::new();

    for error in errors.skip(skip) {
        let pattern = patterns.entry(error.error_type.clone()).or_default();
        pattern.count += 1;
        if let Some(resolution) = &error.resolution {
            pattern.resolutions.push(resolution.clone());
        }
        pattern.last_occurrence = Some(error.timestamp);
    }

    patterns
}

/// Venues with the most failed decisions among the most recent
/// `FOCUS_DECISION_WINDOW`. Ties keep first-seen order.
pub fn recommended_focus_areas<'a, I>(decisions: I) -> Vec<FocusArea>
where
    I: DoubleEndedIterator<Item = &'a Decision> + ExactSizeIterator,
{
    let skip = decisions.len().saturating_sub(FOCUS_DECISION_WINDOW);
    let mut index: HashMap<VenueId, usize> = HashMap::new();
    let mut areas: Vec<FocusArea> = Vec::new();

    for decision in decisions.skip(skip) {
        if decision.outcome != Outcome::Failed {
            continue;
        }
        let slot = *index.entry(decision.venue_id).or_insert_with(|| {
            areas.push(FocusArea {
                venue_id: Some(decision.venue_id),
                name: decision.venue_name.clone(),
                count: 0,
            });
            areas.len() - 1
        });
        areas[slot].count += 1;
    }

    areas.sort_by(|a, b| b.count.cmp(&a.count));
    areas.truncate(FOCUS_AREAS);
    areas
}

/// Per-agent tallies over the most recent `DECISION_PATTERN_WINDOW` decisions
pub fn decision_patterns<'a, I>(decisions: I) -> Option<BTreeMap<String, DecisionPattern>>
where
    I: DoubleEndedIterator<Item = &'a Decision> + ExactSizeIterator,
{
    if decisions.len() == 0 {
        return None;
    }
    let skip = decisions.len().saturating_sub(DECISION_PATTERN_WINDOW);
    let mut by_agent: BTreeMap<String, DecisionPattern> = BTreeMap::new();

    for decision in decisions.skip(skip) {
        let pattern = by_agent.entry(decision.agent.clone()).or_default();
        pattern.total += 1;
        match decision.outcome {
            Outcome::Success => pattern.successful += 1,
            Outcome::Failed => pattern.failed += 1,
        }
    }

    Some(by_agent)
}

/// Keep only entries strictly newer than `now - retention`
pub fn prune_by_age<T, F>(entries: &mut Vec<T>, now: DateTime<Utc>, retention: chrono::Duration, timestamp: F)
where
    F: Fn(&T) -> DateTime<Utc>,
{
    let cutoff = now - retention;
    entries.retain(|entry| timestamp(entry) > cutoff);
}
