//! Extraction prompts built from learned venue context

use serde_json::Value;

use crate::memory::VenueProfile;
use crate::types::Venue;

/// How many learned titles/times/categories go into a prompt
const PATTERN_SAMPLES: usize = 3;

/// Build an extraction prompt for `venue` that carries what the agents have
/// learned so far: the venue profile's patterns and a few recent extractions
/// as in-context examples.
pub fn build_learned_prompt(venue: &Venue, profile: Option<&VenueProfile>, examples: &[Value]) -> String {
    let city = venue.city.as_deref().unwrap_or("Southeast Texas");
    let category = venue.category.as_deref().unwrap_or("Community Event");
    let source_url = venue.source_url().unwrap_or("");

    let mut prompt = format!(
        "You are an expert event extractor for {} in {}, Texas.\n\n\
         VENUE CONTEXT:\n\
         - Name: {}\n\
         - Type: {}\n\
         - Website: {}\n",
        venue.name,
        city,
        venue.name,
        category,
        if source_url.is_empty() { "Unknown" } else { source_url },
    );
    if let Some(description) = &venue.description {
        prompt.push_str(&format!("- About: {}\n", description));
    }

    if let Some(profile) = profile {
        prompt.push_str("\nLEARNED PATTERNS FOR THIS VENUE:\n");
        prompt.push_str(&format!(
            "Successful event titles: {}\n",
            sample(profile.patterns.event_titles.iter(), "None yet")
        ));
        prompt.push_str(&format!(
            "Common event times: {}\n",
            sample(profile.patterns.event_times.iter(), "Varies")
        ));
        prompt.push_str(&format!(
            "Categories: {}\n",
            sample(profile.patterns.event_categories.iter(), "Various")
        ));
        prompt.push_str(&format!("Previous successful scrapes: {}\n", profile.successful_scrapes_count));
        if let Some(agent) = &profile.last_learning_from {
            prompt.push_str(&format!("Last learned from: {}\n", agent));
        }
    }

    if !examples.is_empty() {
        prompt.push_str("\nSUCCESSFUL EXTRACTION EXAMPLES FROM THIS VENUE:\n");
        for (i, example) in examples.iter().enumerate() {
            prompt.push_str(&format!("\nExample {}:\n", i + 1));
            for field in ["title", "date", "time", "category", "description"] {
                if let Some(value) = example.get(field).and_then(Value::as_str) {
                    prompt.push_str(&format!("- {}: {}\n", capitalize(field), value));
                }
            }
        }
        prompt.push_str("\nUse these examples as templates for what we're looking for.\n");
    }

    prompt.push_str(&format!(
        "\nTASK: Extract upcoming events for the next 30 days, following the patterns above.\n\n\
         Return a JSON array with this exact structure:\n\
         [\n  {{\n\
         \x20   \"title\": \"Event name\",\n\
         \x20   \"date\": \"YYYY-MM-DD\",\n\
         \x20   \"time\": \"HH:MM AM/PM or time range\",\n\
         \x20   \"location\": \"{}\",\n\
         \x20   \"city\": \"{}\",\n\
         \x20   \"category\": \"{}\",\n\
         \x20   \"description\": \"Brief description\",\n\
         \x20   \"source_url\": \"{}\"\n\
         \x20 }}\n]\n\n\
         Only include events that are confirmed and upcoming.\n\
         Return valid JSON only, no additional text.\n",
        venue.name, city, category, source_url
    ));

    prompt
}

fn sample<'a>(items: impl Iterator<Item = &'a String>, fallback: &str) -> String {
    let picked: Vec<&str> = items.take(PATTERN_SAMPLES).map(String::as_str).collect();
    if picked.is_empty() {
        fallback.to_string()
    } else {
        picked.join(", ")
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
