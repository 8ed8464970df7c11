//! Markdown reports on the collection and on scrape runs.

use crate::config::Registry;
use crate::scrapers::ScrapeSummary;
use crate::store::{Collection, StoredEvent};
use crate::utils::upcase;
use std::collections::BTreeMap;
use std::fmt::{self, Write};

fn city_of(d: &StoredEvent) -> Option<&str> {
    d.city
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("undefined"))
}

/// Counts per city and venue, plus what is missing: undated or unplaced
/// documents and registry venues with nothing stored.
pub fn collection_report(collection: &Collection, registry: &Registry) -> Result<String, fmt::Error> {
    let mut md = String::new();
    let undated = collection.iter().filter(|d| d.start().is_none()).count();
    let unplaced = collection.iter().filter(|d| city_of(d).is_none()).count();

    writeln!(md, "# Event collection report\n")?;
    if collection.is_empty() {
        writeln!(md, "The collection is empty.\n")?;
    }
    writeln!(md, "- Documents: {}", collection.len())?;
    writeln!(md, "- Without a start date: {undated}")?;
    writeln!(md, "- Without a city: {unplaced}")?;

    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    for d in collection.iter() {
        let status = d.status.as_deref().unwrap_or("unknown");
        *by_status.entry(upcase(status)).or_default() += 1;
    }
    for (status, count) in &by_status {
        writeln!(md, "- {status}: {count}")?;
    }

    let mut by_city: BTreeMap<&str, BTreeMap<&str, usize>> = BTreeMap::new();
    for d in collection.iter() {
        let city = city_of(d).unwrap_or("(no city)");
        let venue = match d.venue_name() {
            "" => "(no venue)",
            name => name,
        };
        *by_city.entry(city).or_default().entry(venue).or_default() += 1;
    }

    writeln!(md, "\n## By city\n")?;
    writeln!(md, "| City | Venues | Events |")?;
    writeln!(md, "|------|--------|--------|")?;
    for (city, venues) in &by_city {
        writeln!(md, "| {} | {} | {} |", city, venues.len(), venues.values().sum::<usize>())?;
    }

    for (city, venues) in &by_city {
        writeln!(md, "\n### {city}\n")?;
        for (venue, count) in venues {
            writeln!(md, "- {venue}: {count}")?;
        }
    }

    let silent: Vec<_> = registry
        .venues
        .iter()
        .filter(|v| {
            collection
                .find(|d| d.venue_name().eq_ignore_ascii_case(&v.name))
                .is_none()
        })
        .collect();
    writeln!(md, "\n## Venues with no stored events\n")?;
    if silent.is_empty() {
        writeln!(md, "None.")?;
    }
    for v in silent {
        writeln!(md, "- {} ({}) `{}`", v.name, v.city, v.id)?;
    }
    Ok(md)
}

/// One row per venue of a scrape run, failures and fallbacks called out.
pub fn scrape_report(summary: &ScrapeSummary) -> Result<String, fmt::Error> {
    let mut md = String::new();
    writeln!(md, "# Scrape report\n")?;
    writeln!(md, "- Venues: {}", summary.outcomes.len())?;
    writeln!(md, "- Events: {}", summary.events.len())?;
    writeln!(md, "- Aggregator fallbacks: {}", summary.fallback_count())?;
    writeln!(md, "- Failures: {}\n", summary.failed().count())?;

    let mut outcomes: Vec<_> = summary.outcomes.iter().collect();
    outcomes.sort_by(|a, b| (&a.city, &a.venue_name).cmp(&(&b.city, &b.venue_name)));

    writeln!(md, "| City | Venue | Events | Source | Note |")?;
    writeln!(md, "|------|-------|--------|--------|------|")?;
    for o in outcomes {
        let note = match (&o.error, o.used_fallback) {
            (Some(e), true) => format!("fallback; {e}"),
            (Some(e), false) => e.clone(),
            (None, true) => "fallback".to_string(),
            (None, false) => String::new(),
        };
        writeln!(
            md,
            "| {} | {} `{}` | {} | {} | {} |",
            o.city,
            o.venue_name,
            o.venue_id,
            o.events.len(),
            o.source_url.as_deref().unwrap_or("-"),
            note.replace('|', "/")
        )?;
    }
    Ok(md)
}
