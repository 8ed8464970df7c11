//! Named cleaning passes over the stored collection.
//!
//! Every pass takes the collection by `&mut` and returns how many documents
//! it touched, so a dry run is just the same passes over a clone.

use crate::config::Registry;
use crate::dates::parse_when;
use crate::extract::resolve_url;
use crate::junk::is_junk_title;
use crate::models::Venue;
use crate::normalize::{Clock, event_id, extract_price};
use crate::store::{Collection, DateField, StoredEvent, VenueField};
use chrono::{Duration, NaiveDateTime};
use clap::ValueEnum;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, instrument};

pub const UNKNOWN_VENUE: &str = "Unknown Venue";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Repair {
    /// Every pass, in the default order.
    All,
    InvalidTitles,
    JunkTitles,
    NullDates,
    VenueStructure,
    CityLabels,
    NullIds,
    BrokenUrls,
    Prices,
    Duplicates,
}

pub const DEFAULT_ORDER: [Repair; 9] = [
    Repair::VenueStructure,
    Repair::InvalidTitles,
    Repair::JunkTitles,
    Repair::NullDates,
    Repair::NullIds,
    Repair::CityLabels,
    Repair::BrokenUrls,
    Repair::Prices,
    Repair::Duplicates,
];

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(v) => f.pad(v.get_name()),
            None => write!(f, "{self:?}"),
        }
    }
}

/// Passes to run for a CLI selection: `all` (or nothing) expands to the
/// default order, otherwise the given order with repeats dropped.
pub fn plan(selected: &[Repair]) -> Vec<Repair> {
    if selected.is_empty() || selected.contains(&Repair::All) {
        return DEFAULT_ORDER.to_vec();
    }
    let mut seen = HashSet::new();
    selected.iter().copied().filter(|r| seen.insert(*r)).collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairReport {
    pub before: usize,
    pub after: usize,
    pub passes: Vec<(Repair, usize)>,
    /// Documents `city-labels` could not place.
    pub unresolved_cities: usize,
}

impl fmt::Display for RepairReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "documents: {} -> {}", self.before, self.after)?;
        for (repair, count) in &self.passes {
            writeln!(f, "  {repair:<16} {count}")?;
        }
        if self.unresolved_cities > 0 {
            writeln!(f, "  unresolved cities: {}", self.unresolved_cities)?;
        }
        Ok(())
    }
}

fn blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

pub fn invalid_titles(collection: &mut Collection) -> usize {
    collection.delete_many(|d| {
        let title = d.title().trim();
        title.is_empty() || matches!(title.to_uppercase().as_str(), "MISSING" | "NO TITLE")
    })
}

pub fn junk_titles(collection: &mut Collection) -> usize {
    collection.delete_many(|d| d.title.as_deref().is_some_and(is_junk_title))
}

/// Re-parse textual start dates; drop documents whose start date is still
/// missing or unreadable afterwards.
pub fn null_dates(collection: &mut Collection, clock: &Clock) -> usize {
    let fixed = collection.update_many(
        |d| matches!(d.start_date, Some(DateField::Raw(_))),
        |d| {
            let Some(DateField::Raw(raw)) = &d.start_date else {
                return;
            };
            if let Some(when) = parse_when(raw, "", clock.today) {
                d.start_date = Some(DateField::Parsed(when.start));
                if d.end_date.as_ref().and_then(DateField::as_naive).is_none() {
                    d.end_date = Some(DateField::Parsed(when.end));
                }
            }
        },
    );
    let deleted = collection.delete_many(|d| d.start().is_none());
    let defaulted_ends = collection.update_many(
        |d| d.end_date.as_ref().and_then(DateField::as_naive).is_none(),
        |d| {
            if let Some(start) = d.start() {
                d.end_date = Some(DateField::Parsed(start + Duration::hours(2)));
            }
        },
    );
    debug!(fixed, deleted, defaulted_ends, "null-dates");
    fixed + deleted + defaulted_ends
}

pub fn venue_structure(collection: &mut Collection) -> usize {
    collection.update_many(
        |d| !matches!(&d.venue, Some(VenueField::Object(v)) if !v.name.trim().is_empty()),
        |d| {
            let venue = match d.venue.take() {
                Some(VenueField::Object(v)) => Venue {
                    name: UNKNOWN_VENUE.to_string(),
                    ..v
                },
                Some(VenueField::Name(name)) if !name.trim().is_empty() => Venue {
                    name: name.trim().to_string(),
                    ..Default::default()
                },
                _ => Venue {
                    name: UNKNOWN_VENUE.to_string(),
                    ..Default::default()
                },
            };
            d.venue = Some(VenueField::Object(venue));
        },
    )
}

fn missing_city(d: &StoredEvent) -> bool {
    match d.city.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(c) => matches!(c.to_lowercase().as_str(), "undefined" | "null" | "unknown"),
    }
}

fn infer_city(d: &StoredEvent, registry: &Registry) -> Option<String> {
    if let Some(VenueField::Object(v)) = &d.venue {
        if let Some(city) = v.city.as_deref().filter(|c| !c.trim().is_empty()) {
            return Some(
                registry
                    .city(city)
                    .map_or_else(|| city.trim().to_string(), |c| c.name.clone()),
            );
        }
    }
    if let Some(venue) = d.source.as_deref().and_then(|s| registry.venue_for_source(s)) {
        return Some(venue.city.clone());
    }
    if let Some(venue) = registry.venue_for_source(d.venue_name()) {
        return Some(venue.city.clone());
    }
    let address = match &d.venue {
        Some(VenueField::Object(v)) => v.address.as_deref(),
        _ => None,
    };
    let street = d.extra.get("streetAddress").and_then(|v| v.as_str());
    [address, street, d.location.as_deref()]
        .into_iter()
        .flatten()
        .find_map(|text| registry.city_in_text(text))
        .map(|c| c.name.clone())
}

/// Fill missing city labels. Returns (fixed, unresolved).
pub fn city_labels(collection: &mut Collection, registry: &Registry) -> (usize, usize) {
    let fixed = collection.update_many(missing_city, |d| {
        if let Some(city) = infer_city(d, registry) {
            d.city = Some(city);
        }
    });
    let unresolved = collection.iter().filter(|d| missing_city(d)).count();
    (fixed, unresolved)
}

pub fn null_ids(collection: &mut Collection) -> usize {
    collection.update_many(
        |d| blank(d.id.as_deref()),
        |d| {
            if let (Some(title), Some(start)) = (d.title.as_deref(), d.start()) {
                d.id = Some(event_id(d.venue_name(), title, start));
            }
        },
    )
}

fn repair_url(url: &Option<String>, base: Option<&str>) -> Option<String> {
    url.as_deref().and_then(|u| resolve_url(base, u))
}

pub fn broken_urls(collection: &mut Collection) -> usize {
    collection.update_many(
        |d| d.official_website.is_some() || d.image_url.is_some(),
        |d| {
            let base = d.source_url.clone();
            d.official_website = repair_url(&d.official_website, base.as_deref());
            d.image_url = repair_url(&d.image_url, base.as_deref());
        },
    )
}

pub fn prices(collection: &mut Collection) -> usize {
    collection.update_many(
        |_| true,
        |d| d.price = Some(extract_price(d.price.as_deref().unwrap_or(""))),
    )
}

fn freshness(d: &StoredEvent) -> Option<NaiveDateTime> {
    d.last_updated.as_ref().and_then(DateField::as_naive)
}

/// Indexes to keep when grouping by `key`: the most recently updated
/// document of each group, the earliest one on ties.
fn survivors(docs: &[StoredEvent], key: impl Fn(&StoredEvent) -> Option<String>) -> HashSet<usize> {
    let mut best: HashMap<String, usize> = HashMap::new();
    let mut keep = HashSet::new();
    for (i, d) in docs.iter().enumerate() {
        let Some(k) = key(d) else {
            keep.insert(i);
            continue;
        };
        match best.get(&k) {
            Some(&j) if freshness(d) <= freshness(&docs[j]) => {}
            _ => {
                best.insert(k, i);
            }
        }
    }
    keep.extend(best.into_values());
    keep
}

pub fn duplicates(collection: &mut Collection) -> usize {
    let by_id = survivors(collection.docs(), |d| {
        d.id.clone().filter(|id| !id.trim().is_empty())
    });
    let mut removed = collection.retain_indexed(|i, _| by_id.contains(&i));
    let by_content = survivors(collection.docs(), |d| {
        let title = d.title.as_deref()?.trim().to_lowercase();
        let start = d.start()?;
        Some(format!("{}|{}|{}", title, start, d.venue_name().to_lowercase()))
    });
    removed += collection.retain_indexed(|i, _| by_content.contains(&i));
    removed
}

/// Run `repairs` in order over `collection`.
#[instrument(level = "info", skip_all, fields(docs = collection.len()))]
pub fn run_repairs(
    collection: &mut Collection,
    repairs: &[Repair],
    registry: &Registry,
    clock: &Clock,
) -> RepairReport {
    let mut report = RepairReport {
        before: collection.len(),
        ..Default::default()
    };
    for repair in plan(repairs) {
        let count = match repair {
            Repair::All => continue,
            Repair::InvalidTitles => invalid_titles(collection),
            Repair::JunkTitles => junk_titles(collection),
            Repair::NullDates => null_dates(collection, clock),
            Repair::VenueStructure => venue_structure(collection),
            Repair::CityLabels => {
                let (fixed, unresolved) = city_labels(collection, registry);
                report.unresolved_cities = unresolved;
                fixed
            }
            Repair::NullIds => null_ids(collection),
            Repair::BrokenUrls => broken_urls(collection),
            Repair::Prices => prices(collection),
            Repair::Duplicates => duplicates(collection),
        };
        info!(%repair, count, remaining = collection.len(), "Repair pass done");
        report.passes.push((repair, count));
    }
    report.after = collection.len();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::{Value, json};

    fn collection(docs: Value) -> Collection {
        serde_json::from_value(docs).unwrap()
    }

    fn clock() -> Clock {
        Clock::at(
            NaiveDate::from_ymd_opt(2026, 6, 15)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        )
    }

    fn titles(c: &Collection) -> Vec<&str> {
        c.iter().map(StoredEvent::title).collect()
    }

    #[test]
    fn test_plan() {
        assert_eq!(plan(&[]), DEFAULT_ORDER.to_vec());
        assert_eq!(plan(&[Repair::Prices, Repair::All]), DEFAULT_ORDER.to_vec());
        assert_eq!(
            plan(&[Repair::Prices, Repair::NullIds, Repair::Prices]),
            vec![Repair::Prices, Repair::NullIds]
        );
        assert_eq!(Repair::CityLabels.to_string(), "city-labels");
    }

    #[test]
    fn test_invalid_and_junk_titles() {
        let mut c = collection(json!([
            {"title": "MISSING"},
            {"title": "  "},
            {"title": null},
            {"title": "no title"},
            {"title": "View All Events"},
            {"title": "Arkells Live at Massey Hall"}
        ]));
        assert_eq!(invalid_titles(&mut c), 4);
        assert_eq!(junk_titles(&mut c), 1);
        assert_eq!(titles(&c), ["Arkells Live at Massey Hall"]);
    }

    #[test]
    fn test_null_dates() {
        let mut c = collection(json!([
            {"title": "a", "startDate": "July 9, 2026"},
            {"title": "b", "startDate": "MISSING"},
            {"title": "c", "startDate": null},
            {"title": "d"},
            {"title": "e", "startDate": "2026-07-11T19:30:00"}
        ]));
        null_dates(&mut c, &clock());
        assert_eq!(titles(&c), ["a", "e"]);
        let a = &c.docs()[0];
        assert_eq!(a.start().unwrap().to_string(), "2026-07-09 10:00:00");
        assert_eq!(
            a.end_date.as_ref().and_then(DateField::as_naive).unwrap().to_string(),
            "2026-07-09 17:00:00"
        );
        let e = &c.docs()[1];
        assert_eq!(
            e.end_date.as_ref().and_then(DateField::as_naive).unwrap().to_string(),
            "2026-07-11 21:30:00"
        );
    }

    #[test]
    fn test_venue_structure() {
        let mut c = collection(json!([
            {"title": "a", "venue": "Fox Cabaret"},
            {"title": "b"},
            {"title": "c", "venue": {"name": "Massey Hall"}},
            {"title": "d", "venue": {"name": "", "city": "Toronto"}}
        ]));
        assert_eq!(venue_structure(&mut c), 3);
        let names: Vec<&str> = c.iter().map(StoredEvent::venue_name).collect();
        assert_eq!(names, ["Fox Cabaret", UNKNOWN_VENUE, "Massey Hall", UNKNOWN_VENUE]);
        assert!(c.iter().all(|d| matches!(d.venue, Some(VenueField::Object(_)))));
        match &c.docs()[3].venue {
            Some(VenueField::Object(v)) => assert_eq!(v.city.as_deref(), Some("Toronto")),
            other => panic!("unexpected venue {other:?}"),
        }
    }

    #[test]
    fn test_city_labels() {
        let registry = Registry::builtin().unwrap();
        let mut c = collection(json!([
            {"title": "a", "city": "undefined", "venue": {"name": "X", "city": "toronto"}},
            {"title": "b", "source": "scrape-fox-cabaret-events", "venue": {"name": "Y"}},
            {"title": "c", "venue": {"name": "Z", "address": "90 Wynford Dr, North York"}},
            {"title": "d", "location": "Somewhere, Nowhere"},
            {"title": "e", "city": "Calgary"},
            {"title": "f", "city": "", "venue": "Nowhere Hall", "streetAddress": "1 Main St, Edmonton, AB"}
        ]));
        let (fixed, unresolved) = city_labels(&mut c, &registry);
        assert_eq!(fixed, 4);
        assert_eq!(unresolved, 1);
        let cities: Vec<Option<&str>> = c.iter().map(|d| d.city.as_deref()).collect();
        assert_eq!(
            cities,
            [
                Some("Toronto"),
                Some("Vancouver"),
                Some("Toronto"),
                None,
                Some("Calgary"),
                Some("Edmonton")
            ]
        );
        // Unknown fields survive the rewrite.
        assert_eq!(c.docs()[5].extra["streetAddress"], "1 Main St, Edmonton, AB");
    }

    #[test]
    fn test_null_ids() {
        let mut c = collection(json!([
            {"title": "Show", "venue": {"name": "Massey Hall"}, "startDate": "2026-07-11T19:30:00"},
            {"id": "keep", "title": "Other"}
        ]));
        assert_eq!(null_ids(&mut c), 1);
        let start = NaiveDate::from_ymd_opt(2026, 7, 11)
            .unwrap()
            .and_hms_opt(19, 30, 0)
            .unwrap();
        assert_eq!(
            c.docs()[0].id.as_deref(),
            Some(event_id("Massey Hall", "Show", start).as_str())
        );
        assert_eq!(c.docs()[1].id.as_deref(), Some("keep"));
    }

    #[test]
    fn test_broken_urls() {
        let mut c = collection(json!([
            {"sourceURL": "https://venue.example.com/events/", "officialWebsite": "show/1", "imageUrl": "//cdn.example.com/a.jpg"},
            {"officialWebsite": "https://ok.example.com/x"},
            {"officialWebsite": "http://[broken"}
        ]));
        assert_eq!(broken_urls(&mut c), 2);
        let d = c.docs();
        assert_eq!(d[0].official_website.as_deref(), Some("https://venue.example.com/events/show/1"));
        assert_eq!(d[0].image_url.as_deref(), Some("https://cdn.example.com/a.jpg"));
        assert_eq!(d[1].official_website.as_deref(), Some("https://ok.example.com/x"));
        assert_eq!(d[2].official_website, None);
    }

    #[test]
    fn test_prices() {
        let mut c = collection(json!([
            {"price": "Tickets: $20 advance / $25 door"},
            {"price": "Free!"},
            {"price": "Free"},
            {}
        ]));
        assert_eq!(prices(&mut c), 3);
        let p: Vec<Option<&str>> = c.iter().map(|d| d.price.as_deref()).collect();
        assert_eq!(
            p,
            [Some("$20 - $25"), Some("Free"), Some("Free"), Some(crate::normalize::PRICE_UNKNOWN)]
        );
    }

    #[test]
    fn test_duplicates_keep_newest() {
        let mut c = collection(json!([
            {"id": "a", "title": "Show", "lastUpdated": "2026-06-01T00:00:00Z"},
            {"id": "a", "title": "Show v2", "lastUpdated": "2026-06-10T00:00:00Z"},
            {"id": "b", "title": "Gig", "startDate": "2026-07-11T19:30:00", "venue": "Fox Cabaret"},
            {"id": "c", "title": "GIG", "startDate": "2026-07-11T19:30:00", "venue": "fox cabaret", "lastUpdated": "2026-06-02T00:00:00Z"},
            {"title": "Unkeyed"}
        ]));
        assert_eq!(duplicates(&mut c), 2);
        assert_eq!(titles(&c), ["Show v2", "GIG", "Unkeyed"]);
    }

    #[test]
    fn test_run_repairs_all() {
        let registry = Registry::builtin().unwrap();
        let mut c = collection(json!([
            {"title": "Arkells Live", "venue": "Massey Hall", "startDate": "July 11, 2026", "source": "massey-hall", "price": "$45"},
            {"title": "Arkells Live", "venue": "Massey Hall", "startDate": "2026-07-11T10:00:00", "source": "massey-hall"},
            {"title": "MISSING", "startDate": "July 11, 2026"},
            {"title": "Cool Show Live", "startDate": "whenever"}
        ]));
        let report = run_repairs(&mut c, &[Repair::All], &registry, &clock());
        assert_eq!(report.before, 4);
        assert_eq!(report.after, 1);
        assert_eq!(report.passes.len(), DEFAULT_ORDER.len());
        let doc = &c.docs()[0];
        assert_eq!(doc.city.as_deref(), Some("Toronto"));
        assert!(doc.id.is_some());
        assert!(report.to_string().contains("duplicates"));
    }
}
