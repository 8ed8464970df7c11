//! Venue registry: which cities exist, which venues belong to them, and how
//! each venue's listing page is read.
//!
//! The registry is YAML. A default registry is compiled into the binary from
//! `config/venues.yaml`; a user file passed with `--config` is merged over it.

use crate::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, instrument};
use url::Url;

const BUILTIN_REGISTRY: &str = include_str!("../config/venues.yaml");

/// A general city event-listing site scanned when a venue yields nothing.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AggregatorConfig {
    pub name: String,
    /// Listing URL. `{query}` is replaced with the URL-encoded venue name.
    pub url: String,
}

impl AggregatorConfig {
    pub fn url_for(&self, venue_name: &str) -> String {
        self.url
            .replace("{query}", &urlencoding::encode(venue_name))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CityConfig {
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
    /// Other spellings and districts that identify the city in free text.
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub aggregators: Vec<AggregatorConfig>,
}

impl CityConfig {
    /// `"Toronto, Ontario"`-style location label.
    pub fn location_label(&self) -> String {
        if self.region.is_empty() {
            self.name.clone()
        } else {
            format!("{}, {}", self.name, self.region)
        }
    }

    fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

/// Priority-ordered CSS selectors for one listing page layout.
///
/// Empty lists mean "use the generic profile for this field".
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SelectorProfile {
    pub containers: Vec<String>,
    pub fallback_containers: Vec<String>,
    pub title: Vec<String>,
    pub date: Vec<String>,
    pub time: Vec<String>,
    pub description: Vec<String>,
    pub image: Vec<String>,
    pub link: Vec<String>,
    pub price: Vec<String>,
    pub kind: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl SelectorProfile {
    /// Selectors that work on a wide range of venue sites.
    pub fn generic() -> Self {
        Self {
            containers: strings(&[
                ".event",
                ".event-card",
                ".event-item",
                "[class*=\"event\"]",
                ".show",
                "[class*=\"show\"]",
                ".concert",
                ".performance",
                ".program-item",
                ".listing",
                "[class*=\"listing\"]",
                "article",
                ".card",
                "[data-event]",
                "[data-date]",
            ]),
            fallback_containers: strings(&[
                ".grid-item",
                ".listing-item",
                ".post",
                ".item",
                ".calendar-item",
                ".tile",
                "li",
            ]),
            title: strings(&[
                "h1",
                "h2",
                "h3",
                "h4",
                "h5",
                ".title",
                "[class*=\"title\"]",
                ".name",
                ".headline",
                "a[href*=\"/event\"]",
                "a[href*=\"/show\"]",
                "strong",
                ".artist",
                "a",
            ]),
            date: strings(&[
                "time",
                ".date",
                "[class*=\"date\"]",
                ".when",
                ".schedule",
                ".datetime",
                "[class*=\"day\"]",
            ]),
            time: strings(&[".time", "[class*=\"time\"]", ".hours"]),
            description: strings(&[
                ".description",
                "[class*=\"description\"]",
                ".excerpt",
                ".summary",
                "p",
            ]),
            image: strings(&["img"]),
            link: strings(&["a[href]"]),
            price: strings(&[".price", "[class*=\"price\"]", ".cost", ".fee", ".admission"]),
            kind: strings(&[".type", ".category", "[class*=\"category\"]", ".tag"]),
        }
    }

    /// Overlay `self` on `base`: non-empty fields of `self` win.
    pub fn over(&self, base: &SelectorProfile) -> SelectorProfile {
        fn pick(ours: &[String], theirs: &[String]) -> Vec<String> {
            if ours.is_empty() {
                theirs.to_vec()
            } else {
                ours.to_vec()
            }
        }
        SelectorProfile {
            containers: pick(&self.containers, &base.containers),
            fallback_containers: pick(&self.fallback_containers, &base.fallback_containers),
            title: pick(&self.title, &base.title),
            date: pick(&self.date, &base.date),
            time: pick(&self.time, &base.time),
            description: pick(&self.description, &base.description),
            image: pick(&self.image, &base.image),
            link: pick(&self.link, &base.link),
            price: pick(&self.price, &base.price),
            kind: pick(&self.kind, &base.kind),
        }
    }
}

fn default_category() -> String {
    "Events".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct VenueConfig {
    pub id: String,
    pub name: String,
    pub city: String,
    #[serde(default)]
    pub address: String,
    /// Listing pages, tried in order.
    pub urls: Vec<String>,
    #[serde(default = "default_category")]
    pub default_category: String,
    /// Categories every event from this venue carries.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Fetch each event's own page to fill in longer details.
    #[serde(default)]
    pub follow_details: bool,
    #[serde(default)]
    pub selectors: Option<SelectorProfile>,
}

impl VenueConfig {
    /// The venue's selectors laid over the generic profile.
    pub fn profile(&self) -> SelectorProfile {
        let generic = SelectorProfile::generic();
        match &self.selectors {
            Some(own) => own.over(&generic),
            None => generic,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Registry {
    #[serde(default)]
    pub cities: Vec<CityConfig>,
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
}

impl Registry {
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml(BUILTIN_REGISTRY)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let registry = Self::from_yaml(&text)?;
        info!(
            cities = registry.cities.len(),
            venues = registry.venues.len(),
            "Loaded venue registry"
        );
        Ok(registry)
    }

    /// Built-in registry with an optional user file merged over it.
    pub fn resolve(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut registry = Self::builtin()?;
        if let Some(path) = path {
            registry.merge(Self::load(path)?);
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Entries in `other` replace same-name cities and same-id venues.
    pub fn merge(&mut self, other: Registry) {
        for city in other.cities {
            match self.cities.iter_mut().find(|c| c.name.eq_ignore_ascii_case(&city.name)) {
                Some(existing) => *existing = city,
                None => self.cities.push(city),
            }
        }
        for venue in other.venues {
            match self.venues.iter_mut().find(|v| v.id == venue.id) {
                Some(existing) => *existing = venue,
                None => self.venues.push(venue),
            }
        }
        debug!(cities = self.cities.len(), venues = self.venues.len(), "Merged registry");
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        for venue in &self.venues {
            if !ids.insert(venue.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate venue id `{}`", venue.id)));
            }
            if self.city(&venue.city).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "venue `{}` references unknown city `{}`",
                    venue.id, venue.city
                )));
            }
            if venue.urls.is_empty() {
                return Err(ConfigError::Invalid(format!("venue `{}` has no urls", venue.id)));
            }
            for url in &venue.urls {
                if Url::parse(url).is_err() {
                    return Err(ConfigError::Invalid(format!(
                        "venue `{}` has an unparseable url `{}`",
                        venue.id, url
                    )));
                }
            }
        }
        Ok(())
    }

    /// Case-insensitive lookup by city name or alias.
    pub fn city(&self, name: &str) -> Option<&CityConfig> {
        let name = name.trim();
        self.cities
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .or_else(|| self.cities.iter().find(|c| c.matches_name(name)))
    }

    pub fn venue(&self, id: &str) -> Option<&VenueConfig> {
        self.venues.iter().find(|v| v.id == id)
    }

    pub fn venues_in<'a>(&'a self, city: &'a CityConfig) -> impl Iterator<Item = &'a VenueConfig> + 'a {
        self.venues
            .iter()
            .filter(move |v| city.matches_name(&v.city))
    }

    /// Venue whose id or name matches a stored `source` label.
    ///
    /// Labels are compared with separators ignored, so `"fox-cabaret"`,
    /// `"Fox Cabaret"` and `"foxcabaret"` all resolve to the same venue.
    pub fn venue_for_source(&self, source: &str) -> Option<&VenueConfig> {
        let wanted = squash(source);
        if wanted.is_empty() {
            return None;
        }
        self.venues
            .iter()
            .find(|v| squash(&v.id) == wanted || squash(&v.name) == wanted)
            .or_else(|| {
                self.venues.iter().find(|v| {
                    let id = squash(&v.id);
                    wanted.contains(&id) || (wanted.len() >= 6 && id.contains(&wanted))
                })
            })
    }

    /// City named in free text (address, location). Full city names are
    /// checked for every city before any alias is.
    pub fn city_in_text(&self, text: &str) -> Option<&CityConfig> {
        let words = |needle: &str| {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(needle)))
                .map(|re| re.is_match(text))
                .unwrap_or(false)
        };
        self.cities
            .iter()
            .find(|c| words(&c.name))
            .or_else(|| {
                self.cities
                    .iter()
                    .find(|c| c.aliases.iter().any(|a| words(a)))
            })
    }
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
