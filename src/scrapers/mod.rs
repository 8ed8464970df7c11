//! Venue scraping.
//!
//! Every venue in the registry is scraped the same way, with per-venue
//! selector overrides kept in configuration:
//!
//! 1. **Listing**: fetch the first venue URL that answers and pull listings
//!    out of it ([`crate::extract`])
//! 2. **Details**: for venues that keep dates or descriptions on per-event
//!    pages, follow each listing's link and take the richer text
//! 3. **Fallback**: when the venue's own pages produce nothing, scan the
//!    city's aggregator pages for listings that mention the venue
//!
//! Per-venue failures are logged and reported in the [`VenueOutcome`]; they
//! never abort the batch.

use crate::config::{CityConfig, Registry, SelectorProfile, VenueConfig};
use crate::dedupe::dedupe;
use crate::error::{ConfigError, FetchError};
use crate::extract::{extract_detail, extract_listings};
use crate::fetch::{FetchPage, fetch_first, is_blacklisted};
use crate::models::{Event, RawListing};
use crate::normalize::{Clock, Origin, normalize_listing};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct VenueOutcome {
    pub venue_id: String,
    pub venue_name: String,
    pub city: String,
    pub events: Vec<Event>,
    /// Page the events came from.
    pub source_url: Option<String>,
    pub used_fallback: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeSummary {
    pub outcomes: Vec<VenueOutcome>,
    /// Union of all outcomes, deduplicated.
    pub events: Vec<Event>,
}

impl ScrapeSummary {
    /// Venues that errored and produced nothing, not even from a fallback.
    pub fn failed(&self) -> impl Iterator<Item = &VenueOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.error.is_some() && o.events.is_empty())
    }

    pub fn fallback_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.used_fallback).count()
    }
}

fn prefer_longer(ours: &mut String, theirs: String) {
    if theirs.trim().chars().count() > ours.trim().chars().count() {
        *ours = theirs;
    }
}

pub struct VenueScraper<'a, F> {
    fetcher: &'a F,
    clock: Clock,
}

impl<'a, F: FetchPage> VenueScraper<'a, F> {
    pub fn new(fetcher: &'a F, clock: Clock) -> Self {
        Self { fetcher, clock }
    }

    fn normalize_all(&self, listings: &[RawListing], origin: Origin<'_>) -> Vec<Event> {
        let events = listings
            .iter()
            .filter_map(|l| normalize_listing(l, origin, &self.clock))
            .collect();
        dedupe(events)
    }

    /// Take longer description, date, time, price and kind text from each
    /// listing's own page.
    async fn enrich(
        &self,
        listings: Vec<RawListing>,
        page_url: &str,
        profile: &SelectorProfile,
    ) -> Vec<RawListing> {
        stream::iter(listings)
            .then(|mut listing| async move {
                let Some(url) = listing.event_url.clone() else {
                    return listing;
                };
                if url.trim_end_matches('/') == page_url.trim_end_matches('/') || is_blacklisted(&url) {
                    return listing;
                }
                match self.fetcher.fetch(&url).await {
                    Ok(html) => {
                        if let Some(detail) = extract_detail(&html, &url, profile) {
                            prefer_longer(&mut listing.description, detail.description);
                            prefer_longer(&mut listing.date_text, detail.date_text);
                            prefer_longer(&mut listing.time_text, detail.time_text);
                            prefer_longer(&mut listing.price_text, detail.price_text);
                            prefer_longer(&mut listing.kind, detail.kind);
                            if listing.image_url.is_none() {
                                listing.image_url = detail.image_url;
                            }
                            debug!(%url, "Enriched listing from detail page");
                        }
                    }
                    Err(e) => warn!(%url, error = %e, "Detail page failed; keeping listing text"),
                }
                listing
            })
            .collect()
            .await
    }

    /// Aggregator listings that mention the venue by name. The first
    /// aggregator that yields anything wins.
    async fn from_aggregators(
        &self,
        venue: &VenueConfig,
        city: &CityConfig,
    ) -> Option<(String, Vec<Event>)> {
        let needle = venue.name.to_lowercase();
        let profile = SelectorProfile::generic();
        for aggregator in &city.aggregators {
            let url = aggregator.url_for(&venue.name);
            let html = match self.fetcher.fetch(&url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(aggregator = %aggregator.name, %url, error = %e, "Aggregator fetch failed");
                    continue;
                }
            };
            let mentioning: Vec<RawListing> = extract_listings(&html, &url, &profile)
                .into_iter()
                .filter(|l| l.text.to_lowercase().contains(&needle))
                .collect();
            let origin = Origin {
                venue,
                city,
                source: &aggregator.name,
                source_url: &url,
            };
            let events = self.normalize_all(&mentioning, origin);
            info!(
                aggregator = %aggregator.name,
                mentioning = mentioning.len(),
                events = events.len(),
                "Scanned aggregator"
            );
            if !events.is_empty() {
                return Some((url, events));
            }
        }
        None
    }

    #[instrument(level = "info", skip_all, fields(venue = %venue.id))]
    pub async fn scrape(&self, venue: &VenueConfig, city: &CityConfig) -> VenueOutcome {
        let mut outcome = VenueOutcome {
            venue_id: venue.id.clone(),
            venue_name: venue.name.clone(),
            city: city.name.clone(),
            ..Default::default()
        };
        let profile = venue.profile();

        match fetch_first(self.fetcher, &venue.urls).await {
            Ok((url, html)) => {
                let mut listings = extract_listings(&html, &url, &profile);
                if venue.follow_details {
                    listings = self.enrich(listings, &url, &profile).await;
                }
                let origin = Origin {
                    venue,
                    city,
                    source: &venue.id,
                    source_url: &url,
                };
                outcome.events = self.normalize_all(&listings, origin);
                info!(
                    listings = listings.len(),
                    events = outcome.events.len(),
                    %url,
                    "Scraped venue page"
                );
                outcome.source_url = Some(url);
            }
            Err(FetchError::Blacklisted(url)) => {
                debug!(%url, "Every venue URL is blacklisted");
            }
            Err(e) => {
                error!(error = %e, "Venue pages unavailable");
                outcome.error = Some(e.to_string());
            }
        }

        if outcome.events.is_empty() {
            if let Some((url, events)) = self.from_aggregators(venue, city).await {
                info!(count = events.len(), %url, "Using aggregator fallback");
                outcome.events = events;
                outcome.source_url = Some(url);
                outcome.used_fallback = true;
            }
        }
        outcome
    }
}

/// Venues to scrape. Explicit venue ids win over city filters; with neither,
/// every venue in the registry.
pub fn select_venues<'r>(
    registry: &'r Registry,
    cities: &[String],
    venue_ids: &[String],
) -> Result<Vec<(&'r VenueConfig, &'r CityConfig)>, ConfigError> {
    let venues: Vec<&VenueConfig> = if !venue_ids.is_empty() {
        venue_ids
            .iter()
            .map(|id| {
                registry
                    .venue(id)
                    .ok_or_else(|| ConfigError::Invalid(format!("unknown venue `{id}`")))
            })
            .collect::<Result<_, _>>()?
    } else if !cities.is_empty() {
        let mut picked = Vec::new();
        for name in cities {
            let city = registry
                .city(name)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown city `{name}`")))?;
            picked.extend(registry.venues_in(city));
        }
        picked
    } else {
        registry.venues.iter().collect()
    };

    Ok(venues
        .into_iter()
        .filter_map(|v| match registry.city(&v.city) {
            Some(city) => Some((v, city)),
            None => {
                warn!(venue = %v.id, city = %v.city, "Venue city not in registry; skipping");
                None
            }
        })
        .collect())
}

/// Scrape `selection` with at most `concurrency` venues in flight.
#[instrument(level = "info", skip_all, fields(venues = selection.len(), concurrency))]
pub async fn run_scrape<F: FetchPage>(
    selection: &[(&VenueConfig, &CityConfig)],
    fetcher: &F,
    clock: Clock,
    concurrency: usize,
) -> ScrapeSummary {
    let scraper = VenueScraper::new(fetcher, clock);
    let outcomes: Vec<VenueOutcome> = stream::iter(selection.iter())
        .map(|(venue, city)| scraper.scrape(venue, city))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let events = dedupe(outcomes.iter().flat_map(|o| o.events.iter().cloned()).collect());
    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
    info!(
        venues = outcomes.len(),
        events = events.len(),
        failed,
        "Scrape complete"
    );
    ScrapeSummary { outcomes, events }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticFetcher;
    use chrono::NaiveDate;

    const MASSEY: &str = r#"
        <html><body>
          <div class="event-card">
            <h3>Arkells Live in Concert</h3>
            <time datetime="2026-07-11T19:30:00">Jul 11</time>
            <span class="price">$45 - $95</span>
            <a href="/events/arkells">Tickets</a>
          </div>
          <div class="event-card">
            <h3>An Evening with Feist</h3>
            <div class="date">Saturday, August 8th, 2026</div>
            <div class="time">8:00 pm</div>
          </div>
          <div class="event-card">
            <h3>View All Events</h3>
            <div class="date">July 1, 2026</div>
          </div>
        </body></html>
    "#;

    const TODOCANADA: &str = r#"
        <html><body>
          <div class="event-card">
            <h3>Jazz Festival Opening Night</h3>
            <div class="date">July 3, 2026</div>
            <p class="where">Massey Hall, Toronto</p>
          </div>
          <div class="event-card">
            <h3>Symphony Live Under the Stars</h3>
            <div class="date">July 4, 2026</div>
            <p class="where">Roy Thomson Hall</p>
          </div>
        </body></html>
    "#;

    fn clock() -> Clock {
        Clock::at(
            NaiveDate::from_ymd_opt(2026, 6, 15)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        )
    }

    fn pick<'r>(registry: &'r Registry, id: &str) -> (&'r VenueConfig, &'r CityConfig) {
        let venue = registry.venue(id).unwrap();
        (venue, registry.city(&venue.city).unwrap())
    }

    #[tokio::test]
    async fn test_scrape_venue_page() {
        let registry = Registry::builtin().unwrap();
        let (venue, city) = pick(&registry, "massey-hall");
        let fetcher = StaticFetcher::new().with_page("https://www.masseyhall.com/events", MASSEY);
        let outcome = VenueScraper::new(&fetcher, clock()).scrape(venue, city).await;

        assert!(outcome.error.is_none());
        assert!(!outcome.used_fallback);
        assert_eq!(outcome.source_url.as_deref(), Some("https://www.masseyhall.com/events"));
        let titles: Vec<&str> = outcome.events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Arkells Live in Concert", "An Evening with Feist"]);

        let arkells = &outcome.events[0];
        assert_eq!(arkells.price, "$45 - $95");
        assert_eq!(arkells.official_website, "https://www.masseyhall.com/events/arkells");
        assert_eq!(arkells.source, "massey-hall");
        let feist = &outcome.events[1];
        assert_eq!(feist.start_date.to_string(), "2026-08-08 20:00:00");
        assert_eq!(feist.official_website, "https://www.masseyhall.com/events");
    }

    #[tokio::test]
    async fn test_scrape_falls_through_venue_urls() {
        let registry = Registry::builtin().unwrap();
        let (venue, city) = pick(&registry, "horseshoe-tavern");
        let fetcher = StaticFetcher::new().with_page("https://www.horseshoetavern.com", MASSEY);
        let outcome = VenueScraper::new(&fetcher, clock()).scrape(venue, city).await;
        assert_eq!(outcome.source_url.as_deref(), Some("https://www.horseshoetavern.com"));
        assert_eq!(outcome.events.len(), 2);
        assert!(outcome.events.iter().all(|e| e.venue.name == "Horseshoe Tavern"));
    }

    #[tokio::test]
    async fn test_follow_details() {
        let registry = Registry::builtin().unwrap();
        let (venue, city) = pick(&registry, "the-cultch");
        let listing = r#"<div class="event-card"><h3>Mother Tongue Theatre Night</h3>
            <div class="date">July 20, 2026</div><a href="/whats-on/mother-tongue/">More</a></div>"#;
        let detail = r#"<html><body><h1>Mother Tongue</h1>
            <div class="event-date">July 20, 2026</div><div class="event-time">7:30 pm</div>
            <div class="description">A bilingual comedy about family, migration and the words we lose along the way.</div>
            <span class="price">$35</span></body></html>"#;
        let fetcher = StaticFetcher::new()
            .with_page("https://thecultch.com/whats-on/", listing)
            .with_page("https://thecultch.com/whats-on/mother-tongue/", detail);
        let outcome = VenueScraper::new(&fetcher, clock()).scrape(venue, city).await;

        assert_eq!(outcome.events.len(), 1);
        let event = &outcome.events[0];
        assert_eq!(event.title, "Mother Tongue Theatre Night");
        assert_eq!(event.start_date.to_string(), "2026-07-20 19:30:00");
        assert_eq!(event.price, "$35");
        assert!(event.description.starts_with("A bilingual comedy"));
        assert!(event.categories.contains(&"Comedy".to_string()));
    }

    #[tokio::test]
    async fn test_aggregator_fallback_keeps_venue_mentions() {
        let registry = Registry::builtin().unwrap();
        let (venue, city) = pick(&registry, "massey-hall");
        let fetcher = StaticFetcher::new()
            .with_page("https://www.masseyhall.com/events", "<html><body><p>Nothing on</p></body></html>")
            .with_page("https://www.todocanada.ca/city/toronto/events", TODOCANADA);
        let outcome = VenueScraper::new(&fetcher, clock()).scrape(venue, city).await;

        assert!(outcome.used_fallback);
        assert_eq!(outcome.events.len(), 1);
        let event = &outcome.events[0];
        assert_eq!(event.title, "Jazz Festival Opening Night");
        assert_eq!(event.source, "todocanada");
        assert_eq!(event.source_url, "https://www.todocanada.ca/city/toronto/events");
        assert_eq!(event.venue.name, "Massey Hall");
        // The first aggregator answered, so the second is never asked.
        assert!(!fetcher.hits().iter().any(|u| u.contains("bandsintown")));
    }

    #[tokio::test]
    async fn test_run_scrape_reports_failures() {
        let registry = Registry::builtin().unwrap();
        let selection = select_venues(
            &registry,
            &[],
            &["massey-hall".to_string(), "horseshoe-tavern".to_string()],
        )
        .unwrap();
        let fetcher = StaticFetcher::new().with_page("https://www.masseyhall.com/events", MASSEY);
        let summary = run_scrape(&selection, &fetcher, clock(), DEFAULT_CONCURRENCY).await;

        assert_eq!(summary.outcomes.len(), 2);
        assert_eq!(summary.events.len(), 2);
        let failed: Vec<&str> = summary.failed().map(|o| o.venue_id.as_str()).collect();
        assert_eq!(failed, ["horseshoe-tavern"]);
        assert_eq!(summary.fallback_count(), 0);
    }

    #[tokio::test]
    async fn test_fallback_rescue_is_not_a_failure() {
        let registry = Registry::builtin().unwrap();
        let selection = select_venues(&registry, &[], &["massey-hall".to_string()]).unwrap();
        let fetcher = StaticFetcher::new().with_page("https://www.todocanada.ca/city/toronto/events", TODOCANADA);
        let summary = run_scrape(&selection, &fetcher, clock(), DEFAULT_CONCURRENCY).await;

        let outcome = &summary.outcomes[0];
        assert!(outcome.error.is_some());
        assert!(outcome.used_fallback);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(summary.failed().count(), 0);
        assert_eq!(summary.fallback_count(), 1);
    }

    #[test]
    fn test_select_venues() {
        let registry = Registry::builtin().unwrap();
        let all = select_venues(&registry, &[], &[]).unwrap();
        assert_eq!(all.len(), registry.venues.len());

        let vancouver = select_venues(&registry, &["vancouver".to_string()], &[]).unwrap();
        assert!(!vancouver.is_empty());
        assert!(vancouver.iter().all(|(_, c)| c.name == "Vancouver"));

        assert!(select_venues(&registry, &[], &["nope".to_string()]).is_err());
        assert!(select_venues(&registry, &["Atlantis".to_string()], &[]).is_err());
    }
}
