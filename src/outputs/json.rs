//! Per-city JSON snapshots of the stored collection.
//!
//! ```text
//! json_output_dir/
//! └── 2026-06-15/
//!     ├── toronto.json
//!     └── new-york.json
//! ```

use crate::config::CityConfig;
use crate::store::{Collection, StoredEvent};
use crate::utils::slugify;
use chrono::NaiveDate;
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CitySnapshot<'a> {
    pub city: &'a str,
    pub location: String,
    pub date: NaiveDate,
    pub count: usize,
    pub events: Vec<&'a StoredEvent>,
}

/// Events labelled with `city`, earliest first, undated last.
pub fn city_snapshot<'a>(collection: &'a Collection, city: &'a CityConfig, date: NaiveDate) -> CitySnapshot<'a> {
    let mut events: Vec<&StoredEvent> = collection
        .iter()
        .filter(|d| {
            d.city
                .as_deref()
                .is_some_and(|c| c.trim().eq_ignore_ascii_case(&city.name))
        })
        .collect();
    events.sort_by_key(|d| (d.start().is_none(), d.start()));
    CitySnapshot {
        city: &city.name,
        location: city.location_label(),
        date,
        count: events.len(),
        events,
    }
}

/// Write `{json_output_dir}/{date}/{city-slug}.json` and return its path.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir, city = %city.name))]
pub async fn write_city_snapshot(
    collection: &Collection,
    city: &CityConfig,
    json_output_dir: &str,
    date: NaiveDate,
) -> Result<PathBuf, Box<dyn Error>> {
    let snapshot = city_snapshot(collection, city, date);
    let json = serde_json::to_string_pretty(&snapshot)?;

    let full_json_dir = PathBuf::from(json_output_dir).join(date.to_string());
    info!(full_json_dir = %full_json_dir.display(), "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&full_json_dir).await {
        error!(full_json_dir = %full_json_dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = full_json_dir.join(format!("{}.json", slugify(&city.name)));
    fs::write(&path, json).await?;
    info!(path = %path.display(), count = snapshot.count, "Wrote city snapshot");
    Ok(path)
}
