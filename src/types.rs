//! Shared types used across the memory store and its callers

use serde::{Deserialize, Serialize};

/// Primary key of a row in the `venues` table
pub type VenueId = i64;

/// Agent name used when a caller doesn't specify one
pub const DEFAULT_AGENT: &str = "perplexity";

/// Outcome of a single scrape decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

/// Venue metadata as read from the `venues` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    pub id: VenueId,
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub facebook_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Venue {
    pub fn new(id: VenueId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_city(mut self, city: &str) -> Self {
        self.city = Some(city.to_string());
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_website(mut self, website: &str) -> Self {
        self.website = Some(website.to_string());
        self
    }

    /// Website if known, otherwise the Facebook page
    pub fn source_url(&self) -> Option<&str> {
        self.website.as_deref().or(self.facebook_url.as_deref())
    }
}

/// An event as returned by a scraper agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapedEvent {
    pub title: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub ticket_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub age_restriction: Option<String>,
}

impl ScrapedEvent {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn with_date(mut self, date: &str) -> Self {
        self.date = Some(date.to_string());
        self
    }

    pub fn with_time(mut self, time: &str) -> Self {
        self.time = Some(time.to_string());
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Outcome::Failed).unwrap(), "\"failed\"");
        let parsed: Outcome = serde_json::from_str("\"success\"").unwrap();
        assert_eq!(parsed, Outcome::Success);
    }

    #[test]
    fn test_event_uses_database_column_names() {
        let json = serde_json::json!({
            "title": "Jazz Night",
            "date": "2025-11-14",
            "ticket_url": "https://tickets.example.com/1",
        });
        let event: ScrapedEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.title, "Jazz Night");
        assert_eq!(event.ticket_url.as_deref(), Some("https://tickets.example.com/1"));
        assert!(event.time.is_none());
    }

    #[test]
    fn test_source_url_prefers_website() {
        let mut venue = Venue::new(1, "Jefferson Theatre");
        assert_eq!(venue.source_url(), None);
        venue.facebook_url = Some("https://facebook.com/jt".into());
        assert_eq!(venue.source_url(), Some("https://facebook.com/jt"));
        venue.website = Some("https://jt.example.com".into());
        assert_eq!(venue.source_url(), Some("https://jt.example.com"));
    }
}
