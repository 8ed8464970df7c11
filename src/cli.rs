//! Command-line interface definitions.
//!
//! Every command that touches the store takes `--store`, falling back to
//! `EVENTS_STORE`. The venue registry is the built-in one, with `--config`
//! (or `EVENTS_CONFIG`) merged over it.

use crate::repairs::Repair;
use crate::scrapers::DEFAULT_CONCURRENCY;
use crate::server::DEFAULT_CACHE_TTL;
use clap::{Args, Parser, Subcommand};

/// Scrape venue event listings into a shared collection and keep it clean.
///
/// # Examples
///
/// ```sh
/// # Scrape every Toronto venue into events.json
/// city_events scrape --city Toronto
///
/// # Preview what the cleaning passes would do
/// city_events clean --repair all --dry-run
///
/// # Serve the store for the mobile client
/// city_events serve --addr 0.0.0.0:3000
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Venue registry YAML merged over the built-in registry
    #[arg(short, long, global = true, env = "EVENTS_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Path to the event store (a JSON array of documents)
    #[arg(short, long, env = "EVENTS_STORE", default_value = "events.json")]
    pub store: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape venues and insert new events into the store
    Scrape {
        /// Only venues in this city (repeatable)
        #[arg(long)]
        city: Vec<String>,

        /// Only this venue id (repeatable; wins over --city)
        #[arg(long)]
        venue: Vec<String>,

        #[command(flatten)]
        store: StoreArgs,

        /// Venues scraped at once
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// Scrape and report without writing to the store
        #[arg(long)]
        dry_run: bool,

        /// Write a Markdown report of the run here
        #[arg(long)]
        report: Option<String>,
    },

    /// Run cleaning passes over the store
    Clean {
        #[command(flatten)]
        store: StoreArgs,

        /// Pass to run (repeatable); defaults to all
        #[arg(long, value_enum)]
        repair: Vec<Repair>,

        /// Report what would change without saving
        #[arg(long)]
        dry_run: bool,
    },

    /// Serve the store over HTTP for debugging
    Serve {
        #[command(flatten)]
        store: StoreArgs,

        /// Address to listen on
        #[arg(long, env = "EVENTS_ADDR", default_value = "127.0.0.1:3000")]
        addr: String,

        /// Seconds documents stay cached
        #[arg(long, default_value_t = DEFAULT_CACHE_TTL.as_secs())]
        cache_ttl: u64,
    },

    /// List the venue registry
    Venues {
        /// Only venues in this city
        #[arg(long)]
        city: Option<String>,
    },

    /// Markdown report on the stored collection
    Report {
        #[command(flatten)]
        store: StoreArgs,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Write a per-city JSON snapshot of the store
    Export {
        /// City to export
        #[arg(long)]
        city: String,

        /// Output directory for the JSON snapshot
        #[arg(short, long)]
        json_output_dir: String,

        #[command(flatten)]
        store: StoreArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_parsing() {
        let cli = Cli::parse_from([
            "city_events",
            "scrape",
            "--city",
            "Toronto",
            "--city",
            "Vancouver",
            "--store",
            "/tmp/events.json",
            "--dry-run",
        ]);
        match cli.command {
            Command::Scrape {
                city,
                venue,
                store,
                concurrency,
                dry_run,
                report,
            } => {
                assert_eq!(city, ["Toronto", "Vancouver"]);
                assert!(venue.is_empty());
                assert_eq!(store.store, "/tmp/events.json");
                assert_eq!(concurrency, DEFAULT_CONCURRENCY);
                assert!(dry_run);
                assert!(report.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_clean_repairs() {
        let cli = Cli::parse_from([
            "city_events",
            "--config",
            "venues.yaml",
            "clean",
            "--repair",
            "null-dates",
            "--repair",
            "city-labels",
        ]);
        assert_eq!(cli.config.as_deref(), Some("venues.yaml"));
        match cli.command {
            Command::Clean { repair, dry_run, .. } => {
                assert_eq!(repair, [Repair::NullDates, Repair::CityLabels]);
                assert!(!dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_repair_is_rejected() {
        assert!(Cli::try_parse_from(["city_events", "clean", "--repair", "everything"]).is_err());
    }

    #[test]
    fn test_serve_and_export_short_flags() {
        let cli = Cli::parse_from(["city_events", "serve", "--addr", "0.0.0.0:8080", "--cache-ttl", "5"]);
        match cli.command {
            Command::Serve { addr, cache_ttl, .. } => {
                assert_eq!(addr, "0.0.0.0:8080");
                assert_eq!(cache_ttl, 5);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::parse_from(["city_events", "export", "--city", "Calgary", "-j", "/tmp/json"]);
        match cli.command {
            Command::Export {
                city,
                json_output_dir,
                ..
            } => {
                assert_eq!(city, "Calgary");
                assert_eq!(json_output_dir, "/tmp/json");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
