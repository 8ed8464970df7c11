//! The shared event collection.
//!
//! Documents in the collection were written by several generations of
//! scrapers, so any field may be missing, null, or the wrong shape. A field
//! that cannot be read as its expected type is loaded as `None`; fields this
//! crate does not know about are carried through untouched in `extra`.

use crate::error::StoreError;
use crate::models::{Event, Venue};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// A venue as stored: older documents hold just the name.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum VenueField {
    Name(String),
    Object(Venue),
}

impl VenueField {
    pub fn name(&self) -> &str {
        match self {
            VenueField::Name(name) => name,
            VenueField::Object(venue) => &venue.name,
        }
    }
}

/// A date as stored: naive local time, a zoned timestamp, or text nobody
/// managed to parse.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum DateField {
    Parsed(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
    Raw(String),
}

impl DateField {
    pub fn as_naive(&self) -> Option<NaiveDateTime> {
        match self {
            DateField::Parsed(dt) => Some(*dt),
            DateField::Zoned(dt) => Some(dt.naive_local()),
            DateField::Raw(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    #[serde(rename = "_id", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub start_date: Option<DateField>,
    #[serde(default, deserialize_with = "lenient")]
    pub end_date: Option<DateField>,
    #[serde(default, deserialize_with = "lenient")]
    pub venue: Option<VenueField>,
    #[serde(default, deserialize_with = "lenient")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub official_website: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(
        rename = "sourceURL",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_url: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateField>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StoredEvent {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub fn venue_name(&self) -> &str {
        self.venue.as_ref().map_or("", VenueField::name)
    }

    pub fn start(&self) -> Option<NaiveDateTime> {
        self.start_date.as_ref().and_then(DateField::as_naive)
    }

    /// `id`, else `_id`.
    pub fn any_id(&self) -> Option<&str> {
        self.id.as_deref().or(self.doc_id.as_deref())
    }

    fn same_listing(&self, other: &StoredEvent) -> bool {
        if let (Some(a), Some(b)) = (&self.id, &other.id) {
            if a == b {
                return true;
            }
        }
        match (&self.title, &self.start_date, &other.title, &other.start_date) {
            (Some(t1), Some(d1), Some(t2), Some(d2)) if t1 == t2 => {
                match (d1.as_naive(), d2.as_naive()) {
                    (Some(a), Some(b)) => a == b,
                    _ => d1 == d2,
                }
            }
            _ => false,
        }
    }
}

fn enum_text<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => Some(s),
        _ => None,
    }
}

impl From<Event> for StoredEvent {
    fn from(e: Event) -> Self {
        StoredEvent {
            doc_id: None,
            season: enum_text(&e.season),
            status: enum_text(&e.status),
            id: Some(e.id),
            title: Some(e.title),
            description: Some(e.description),
            categories: Some(e.categories),
            start_date: Some(DateField::Parsed(e.start_date)),
            end_date: Some(DateField::Parsed(e.end_date)),
            venue: Some(VenueField::Object(e.venue)),
            city: Some(e.city),
            location: Some(e.location),
            image_url: e.image_url,
            official_website: Some(e.official_website),
            price: Some(e.price),
            source: Some(e.source),
            source_url: Some(e.source_url),
            last_updated: Some(DateField::Zoned(e.last_updated.fixed_offset())),
            extra: Map::new(),
        }
    }
}

/// In-memory event collection with the handful of operations the scrapers,
/// repairs and server need.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct Collection {
    docs: Vec<StoredEvent>,
}

impl Collection {
    pub fn new(docs: Vec<StoredEvent>) -> Self {
        Self { docs }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredEvent> {
        self.docs.iter()
    }

    pub fn docs(&self) -> &[StoredEvent] {
        &self.docs
    }

    pub fn find(&self, pred: impl Fn(&StoredEvent) -> bool) -> Option<&StoredEvent> {
        self.docs.iter().find(|d| pred(d))
    }

    /// Insert unless a document with the same id, or the same title and
    /// start date, is already present.
    pub fn insert_if_absent(&mut self, doc: StoredEvent) -> bool {
        if self.docs.iter().any(|d| d.same_listing(&doc)) {
            return false;
        }
        self.docs.push(doc);
        true
    }

    /// Apply `f` to every matching document; returns how many `f` changed.
    pub fn update_many(
        &mut self,
        pred: impl Fn(&StoredEvent) -> bool,
        mut f: impl FnMut(&mut StoredEvent),
    ) -> usize {
        let mut changed = 0;
        for doc in self.docs.iter_mut().filter(|d| pred(d)) {
            let before = doc.clone();
            f(doc);
            if *doc != before {
                changed += 1;
            }
        }
        changed
    }

    pub fn delete_many(&mut self, pred: impl Fn(&StoredEvent) -> bool) -> usize {
        let before = self.docs.len();
        self.docs.retain(|d| !pred(d));
        before - self.docs.len()
    }

    /// Keep only the documents `keep` says yes to, in order.
    pub(crate) fn retain_indexed(&mut self, mut keep: impl FnMut(usize, &StoredEvent) -> bool) -> usize {
        let before = self.docs.len();
        let mut i = 0;
        self.docs.retain(|d| {
            let k = keep(i, d);
            i += 1;
            k
        });
        before - self.docs.len()
    }
}

/// A collection persisted as one JSON array on disk.
#[derive(Debug, Clone)]
pub struct EventStore {
    path: PathBuf,
}

impl EventStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// A missing or empty file is an empty collection.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Collection, StoreError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No store file yet; starting empty");
                return Ok(Collection::default());
            }
            Err(e) => return Err(self.io_error(e)),
        };
        if raw.trim().is_empty() {
            return Ok(Collection::default());
        }
        let docs: Vec<StoredEvent> =
            serde_json::from_str(&raw).map_err(|source| StoreError::Malformed {
                path: self.path.display().to_string(),
                source,
            })?;
        let collection = Collection::new(docs);
        info!(count = collection.len(), "Loaded event store");
        Ok(collection)
    }

    /// Written to `<path>.tmp` first, then renamed over the store.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), count = collection.len()))]
    pub async fn save(&self, collection: &Collection) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let body = serde_json::to_vec_pretty(collection)?;
        let tmp = PathBuf::from(format!("{}.tmp", self.path.display()));
        fs::write(&tmp, body).await.map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        info!("Saved event store");
        Ok(())
    }
}
