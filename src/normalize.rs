//! Turn a [`RawListing`] into an [`Event`].
//!
//! Also home to the small field normalizers the repairs reuse: ids, prices,
//! categories, season and status.

use crate::config::{CityConfig, VenueConfig};
use crate::dates::parse_when;
use crate::extract::{clean_date_text, clean_title};
use crate::junk::{is_junk_title, looks_like_last_updated, passes_quality};
use crate::models::{Event, RawListing, Season, Status, Venue};
use crate::utils::truncate_for_log;
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Time reference for one scrape or repair run.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    pub today: NaiveDate,
    pub now: NaiveDateTime,
    pub stamp: DateTime<Utc>,
}

impl Clock {
    pub fn system() -> Self {
        Self {
            stamp: Utc::now(),
            ..Self::at(Local::now().naive_local())
        }
    }

    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            today: now.date(),
            now,
            stamp: now.and_utc(),
        }
    }
}

/// Stable id: the same venue, title and start always hash to the same id.
pub fn event_id(venue_name: &str, title: &str, start: NaiveDateTime) -> String {
    let key = format!("{}-{}-{}", venue_name, title, start.format("%Y-%m-%dT%H:%M:%S"));
    let digest = Sha256::digest(key.as_bytes());
    format!("{:x}", digest)[..32].to_string()
}

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("Exhibition", &["exhibition", "gallery", "collection", "artifact", "display"]),
    ("Performance", &["performance", "concert", "dance", "theatre", "theater"]),
    ("Film", &["film", "movie", "cinema", "documentary", "screening"]),
    ("Talk", &["talk", "lecture", "discussion", "conversation", "speaker", "panel"]),
    ("Workshop", &["workshop", "class", "hands-on"]),
    ("Family", &["family", "kid", "child", "children", "youth"]),
    ("Art", &["art", "artist", "artwork", "painting", "sculpture"]),
    ("Architecture", &["architecture", "design", "building"]),
    ("History", &["history", "heritage", "historical", "ancient", "tradition"]),
    ("Poetry", &["poetry", "poem", "spoken word", "literature"]),
    ("Music", &["music", "concert", "musical", "band", "dj", "jazz", "live"]),
    ("Food", &["food", "culinary", "cuisine", "tasting", "dining"]),
    ("Comedy", &["comedy", "stand-up", "standup", "improv"]),
    ("Nightlife", &["club night", "party", "dance night", "rave"]),
    ("Special Event", &["special", "celebration", "ceremony", "exclusive", "gala"]),
    ("Tour", &["tour", "guided", "walk"]),
];

fn contains_word(haystack: &str, needle: &str) -> bool {
    Regex::new(&format!(r"\b{}\b", regex::escape(needle)))
        .map(|re| re.is_match(haystack))
        .unwrap_or(false)
}

/// Base categories, then the listing's own kind, then keyword matches.
/// Duplicates are dropped, first occurrence wins.
pub fn extract_categories(
    title: &str,
    description: &str,
    kind: &str,
    base: &[String],
) -> Vec<String> {
    let text = format!("{} {}", title, description).to_lowercase();
    let matched = CATEGORY_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| contains_word(&text, k)))
        .map(|(category, _)| category.to_string());

    base.iter()
        .cloned()
        .chain((!kind.trim().is_empty()).then(|| kind.trim().to_string()))
        .chain(matched)
        .filter(|c| !c.is_empty())
        .unique_by(|c| c.to_lowercase())
        .collect()
}

static PRICE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\d+(?:\.\d{2})?").unwrap());

pub const PRICE_UNKNOWN: &str = "See website for details";

pub fn extract_price(text: &str) -> String {
    let lower = text.to_lowercase();
    if lower.trim().is_empty() {
        return PRICE_UNKNOWN.to_string();
    }
    if contains_word(&lower, "free") {
        return "Free".to_string();
    }
    let amounts: Vec<&str> = PRICE.find_iter(text).map(|m| m.as_str()).unique().collect();
    if !amounts.is_empty() {
        return amounts.join(" - ");
    }
    if lower.contains("pay what you can") || contains_word(&lower, "pwyc") {
        return "Pay What You Can".to_string();
    }
    if lower.contains("donation") {
        return "By donation".to_string();
    }
    if lower.contains("with admission") || (lower.contains("included") && lower.contains("admission")) {
        return "Included with admission".to_string();
    }
    PRICE_UNKNOWN.to_string()
}

pub fn season_for(date: NaiveDate) -> Season {
    match date.month() {
        12 | 1 | 2 => Season::Winter,
        3..=5 => Season::Spring,
        6..=8 => Season::Summer,
        _ => Season::Fall,
    }
}

pub fn status_for(start: NaiveDateTime, end: NaiveDateTime, now: NaiveDateTime) -> Status {
    if start > now + Duration::days(7) {
        Status::Upcoming
    } else if start > now || end > now {
        Status::Active
    } else {
        Status::Ended
    }
}

fn default_description(venue_name: &str) -> String {
    format!(
        "Join us at {} for this event. See website for more details.",
        venue_name
    )
}

/// Where a listing was found.
#[derive(Debug, Clone, Copy)]
pub struct Origin<'a> {
    pub venue: &'a VenueConfig,
    pub city: &'a CityConfig,
    /// Venue id, or the aggregator name for fallback listings.
    pub source: &'a str,
    pub source_url: &'a str,
}

/// Validate and shape one listing. `None` means the listing is not an event
/// (junk title, no usable date, page timestamp).
pub fn normalize_listing(raw: &RawListing, origin: Origin<'_>, clock: &Clock) -> Option<Event> {
    let title = clean_title(&raw.title);
    if title.chars().count() < 5 || is_junk_title(&title) {
        debug!(title = %truncate_for_log(&title, 80), "Rejected junk title");
        return None;
    }
    let date_text = clean_date_text(&raw.date_text);
    if !passes_quality(&title, &date_text) || looks_like_last_updated(&title, &date_text, clock.today) {
        debug!(%title, %date_text, "Rejected low-quality listing");
        return None;
    }
    let Some(when) = parse_when(&date_text, &raw.time_text, clock.today) else {
        debug!(%title, %date_text, "Skipping listing with unparseable date");
        return None;
    };

    let venue = origin.venue;
    let description = match raw.description.trim() {
        "" => default_description(&venue.name),
        d => d.to_string(),
    };
    let mut base = vec![origin.city.name.clone(), venue.default_category.clone()];
    base.extend(venue.categories.iter().cloned());

    Some(Event {
        id: event_id(&venue.name, &title, when.start),
        categories: extract_categories(&title, &description, &raw.kind, &base),
        description,
        start_date: when.start,
        end_date: when.end,
        venue: Venue {
            name: venue.name.clone(),
            id: Some(venue.id.clone()),
            address: (!venue.address.is_empty()).then(|| venue.address.clone()),
            city: Some(origin.city.name.clone()),
        },
        city: origin.city.name.clone(),
        location: origin.city.location_label(),
        image_url: raw.image_url.clone(),
        official_website: raw
            .event_url
            .clone()
            .unwrap_or_else(|| origin.source_url.to_string()),
        price: extract_price(&raw.price_text),
        source: origin.source.to_string(),
        source_url: origin.source_url.to_string(),
        season: season_for(when.start.date()),
        status: status_for(when.start, when.end, clock.now),
        last_updated: clock.stamp,
        title,
    })
}
