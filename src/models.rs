//! Data models for scraped listings and normalized events.
//!
//! - [`RawListing`]: what the selector heuristics pulled out of one container
//! - [`Event`]: the common event shape every venue is normalized into
//! - [`Venue`], [`Season`], [`Status`]: parts of an [`Event`]
//!
//! Field names serialize in camelCase (`startDate`, `sourceURL`) to match the
//! documents already in the shared collection.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Text pulled from one listing container, before any interpretation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawListing {
    pub title: String,
    pub date_text: String,
    pub time_text: String,
    pub kind: String,
    pub description: String,
    pub image_url: Option<String>,
    pub event_url: Option<String>,
    pub price_text: String,
    /// Whole container text, used for aggregator venue matching.
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Venue {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Upcoming,
    Active,
    Ended,
}

/// A normalized event, ready to store.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub categories: Vec<String>,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub venue: Venue,
    pub city: String,
    pub location: String,
    pub image_url: Option<String>,
    pub official_website: String,
    pub price: String,
    /// Venue id, or aggregator name for fallback events.
    pub source: String,
    #[serde(rename = "sourceURL")]
    pub source_url: String,
    pub season: Season,
    pub status: Status,
    pub last_updated: DateTime<Utc>,
}
