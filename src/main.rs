//! # City Events
//!
//! Scrapes event listings from venue websites in several cities, normalizes
//! them into one event shape, and keeps them in a shared collection that a
//! mobile client reads.
//!
//! ## Features
//!
//! - One data-driven scraper for every venue in a YAML registry, with
//!   per-venue selector overrides and aggregator fallback
//! - Date, price and category normalization with junk-listing filters
//! - Named repair passes for documents left behind by older scrapers
//! - A debug HTTP server that serves the collection in client shape
//! - Per-city JSON snapshots and Markdown reports
//!
//! ## Usage
//!
//! ```sh
//! city_events scrape --city Toronto --report scrape.md
//! city_events clean --repair all
//! city_events serve
//! ```

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod dates;
mod dedupe;
mod error;
mod extract;
mod fetch;
mod junk;
mod models;
mod normalize;
mod outputs;
mod repairs;
mod scrapers;
mod server;
mod store;
mod utils;

use cli::{Cli, Command};
use config::Registry;
use fetch::{HttpFetcher, RetryFetch};
use normalize::Clock;
use outputs::{json, report};
use store::{EventStore, StoredEvent};
use utils::ensure_writable_dir;

const FETCH_RETRIES: usize = 2;
const FETCH_BASE_DELAY: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let registry = Registry::resolve(args.config.as_deref())?;
    info!(
        cities = registry.cities.len(),
        venues = registry.venues.len(),
        "Venue registry ready"
    );

    let result = match args.command {
        Command::Scrape {
            city,
            venue,
            store,
            concurrency,
            dry_run,
            report,
        } => scrape(&registry, &city, &venue, &store.store, concurrency, dry_run, report.as_deref()).await,
        Command::Clean {
            store,
            repair,
            dry_run,
        } => clean(&registry, &store.store, &repair, dry_run).await,
        Command::Serve {
            store,
            addr,
            cache_ttl,
        } => server::serve(EventStore::open(&store.store), &addr, Duration::from_secs(cache_ttl)).await,
        Command::Venues { city } => list_venues(&registry, city.as_deref()),
        Command::Report { store, output } => collection_report(&registry, &store.store, output.as_deref()).await,
        Command::Export {
            city,
            json_output_dir,
            store,
        } => export(&registry, &city, &json_output_dir, &store.store).await,
    };

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), "Execution complete");
    result
}

#[instrument(level = "info", skip_all, fields(store = %store_path, dry_run))]
async fn scrape(
    registry: &Registry,
    cities: &[String],
    venues: &[String],
    store_path: &str,
    concurrency: usize,
    dry_run: bool,
    report_path: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let selection = scrapers::select_venues(registry, cities, venues)?;
    if selection.is_empty() {
        warn!("No venues selected");
        return Ok(());
    }

    let fetcher = RetryFetch::new(HttpFetcher::new()?, FETCH_RETRIES, FETCH_BASE_DELAY);
    let summary = scrapers::run_scrape(&selection, &fetcher, Clock::system(), concurrency).await;

    if let Some(path) = report_path {
        tokio::fs::write(path, report::scrape_report(&summary)?).await?;
        info!(%path, "Wrote scrape report");
    }

    if dry_run {
        for event in &summary.events {
            println!("{}\t{}\t{}\t{}", event.start_date, event.city, event.venue.name, event.title);
        }
        info!(events = summary.events.len(), "Dry run; store untouched");
        return Ok(());
    }

    let store = EventStore::open(store_path);
    let mut collection = store.load().await?;
    let mut inserted = 0usize;
    for event in &summary.events {
        if collection.insert_if_absent(StoredEvent::from(event.clone())) {
            inserted += 1;
        }
    }
    store.save(&collection).await?;
    info!(
        scraped = summary.events.len(),
        inserted,
        skipped = summary.events.len() - inserted,
        total = collection.len(),
        "Stored scraped events"
    );
    Ok(())
}

#[instrument(level = "info", skip_all, fields(store = %store_path, dry_run))]
async fn clean(
    registry: &Registry,
    store_path: &str,
    selected: &[repairs::Repair],
    dry_run: bool,
) -> Result<(), Box<dyn Error>> {
    let store = EventStore::open(store_path);
    let mut collection = store.load().await?;
    let report = repairs::run_repairs(&mut collection, selected, registry, &Clock::system());
    print!("{report}");
    if dry_run {
        info!("Dry run; store untouched");
    } else {
        store.save(&collection).await?;
    }
    Ok(())
}

fn list_venues(registry: &Registry, city: Option<&str>) -> Result<(), Box<dyn Error>> {
    let cities: Vec<&config::CityConfig> = match city {
        Some(name) => vec![
            registry
                .city(name)
                .ok_or_else(|| error::ConfigError::Invalid(format!("unknown city `{name}`")))?,
        ],
        None => registry.cities.iter().collect(),
    };
    for city in cities {
        println!("{} ({})", city.name, city.location_label());
        for venue in registry.venues_in(city) {
            let details = if venue.follow_details { " [details]" } else { "" };
            println!("  {:<28} {}{}", venue.id, venue.name, details);
        }
    }
    Ok(())
}

async fn collection_report(
    registry: &Registry,
    store_path: &str,
    output: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let collection = EventStore::open(store_path).load().await?;
    let md = report::collection_report(&collection, registry)?;
    match output {
        Some(path) => {
            tokio::fs::write(path, md).await?;
            info!(%path, "Wrote collection report");
        }
        None => print!("{md}"),
    }
    Ok(())
}

async fn export(
    registry: &Registry,
    city: &str,
    json_output_dir: &str,
    store_path: &str,
) -> Result<(), Box<dyn Error>> {
    let city = registry
        .city(city)
        .ok_or_else(|| error::ConfigError::Invalid(format!("unknown city `{city}`")))?;

    // Early check: ensure JSON output dir is writable
    if let Err(e) = ensure_writable_dir(json_output_dir).await {
        error!(
            path = %json_output_dir,
            error = %e,
            "JSON output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let collection = EventStore::open(store_path).load().await?;
    let path = json::write_city_snapshot(&collection, city, json_output_dir, Clock::system().today).await?;
    info!(path = %path.display(), "Export complete");
    Ok(())
}
