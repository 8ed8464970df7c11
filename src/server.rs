//! Debug API over the stored collection.
//!
//! Serves stored documents in the shape the mobile client reads, so what the
//! client shows can be checked against what the scrapers stored. Documents
//! are loaded from the store lazily and cached for `cache_ttl`.

use crate::error::StoreError;
use crate::store::{EventStore, StoredEvent, VenueField};
use crate::utils::slugify;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 500;

/// A stored document in client shape, with the fields filters need.
#[derive(Debug, Clone)]
struct Served {
    id: Option<String>,
    title: String,
    description: String,
    city: String,
    venue: String,
    start: Option<NaiveDateTime>,
    body: Value,
}

fn venue_value(doc: &StoredEvent) -> Value {
    match &doc.venue {
        Some(VenueField::Object(v)) if !v.name.trim().is_empty() => {
            let mut value = json!(v);
            if v.id.is_none() {
                value["id"] = json!(slugify(&v.name));
            }
            value
        }
        Some(VenueField::Name(name)) if !name.trim().is_empty() => {
            json!({ "name": name, "id": slugify(name) })
        }
        _ => json!({ "name": "Unknown Venue", "id": "unknown-venue" }),
    }
}

fn format_doc(doc: &StoredEvent) -> Option<Served> {
    let mut body = match serde_json::to_value(doc) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Could not serialize stored document");
            return None;
        }
    };
    let id = doc.any_id().map(str::to_string);
    body["id"] = json!(id);
    let venue = venue_value(doc);
    let venue_name = venue["name"].as_str().unwrap_or_default().to_string();
    body["venue"] = venue;
    Some(Served {
        id,
        title: doc.title().to_string(),
        description: doc.description.clone().unwrap_or_default(),
        city: doc.city.clone().unwrap_or_default(),
        venue: venue_name,
        start: doc.start(),
        body,
    })
}

struct Cached {
    loaded: Instant,
    docs: Arc<Vec<Served>>,
}

pub struct AppState {
    store: EventStore,
    cache_ttl: Duration,
    cache: RwLock<Option<Cached>>,
}

impl AppState {
    pub fn new(store: EventStore, cache_ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            store,
            cache_ttl,
            cache: RwLock::new(None),
        })
    }

    async fn docs(&self) -> Result<Arc<Vec<Served>>, StoreError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.loaded.elapsed() < self.cache_ttl {
                return Ok(Arc::clone(&cached.docs));
            }
        }
        let mut slot = self.cache.write().await;
        if let Some(cached) = slot.as_ref() {
            if cached.loaded.elapsed() < self.cache_ttl {
                return Ok(Arc::clone(&cached.docs));
            }
        }
        let collection = self.store.load().await?;
        let mut docs: Vec<Served> = collection.iter().filter_map(format_doc).collect();
        docs.sort_by_key(|d| (d.start.is_none(), d.start));
        let docs = Arc::new(docs);
        info!(count = docs.len(), "Loaded documents into cache");
        *slot = Some(Cached {
            loaded: Instant::now(),
            docs: Arc::clone(&docs),
        });
        Ok(docs)
    }

    async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}

type Shared = Arc<AppState>;

pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

async fn health(State(state): State<Shared>) -> Result<Json<Value>, ApiError> {
    let docs = state.docs().await?;
    Ok(Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "events": docs.len(),
    })))
}

async fn all_events(State(state): State<Shared>) -> Result<Json<Value>, ApiError> {
    let docs = state.docs().await?;
    let events: Vec<&Value> = docs.iter().map(|d| &d.body).collect();
    Ok(Json(json!({ "events": events })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    city: Option<String>,
    venue: Option<String>,
    search: Option<String>,
    limit: Option<usize>,
    page: Option<usize>,
}

fn contains_ci(haystack: &str, needle: &Option<String>) -> bool {
    match needle.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(n) => haystack.to_lowercase().contains(&n.to_lowercase()),
    }
}

async fn list_events(
    State(state): State<Shared>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let docs = state.docs().await?;
    let matching: Vec<&Served> = docs
        .iter()
        .filter(|d| contains_ci(&d.city, &params.city))
        .filter(|d| contains_ci(&d.venue, &params.venue))
        .filter(|d| {
            contains_ci(&d.title, &params.search) || contains_ci(&d.description, &params.search)
        })
        .collect();

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let page = params.page.unwrap_or(1).max(1);
    let total = matching.len();
    let events: Vec<&Value> = matching
        .iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .map(|d| &d.body)
        .collect();

    Ok(Json(json!({
        "events": events,
        "pagination": {
            "total": total,
            "page": page,
            "limit": limit,
            "pages": total.div_ceil(limit),
        }
    })))
}

async fn event_by_id(
    State(state): State<Shared>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let docs = state.docs().await?;
    docs.iter()
        .find(|d| d.id.as_deref() == Some(id.as_str()))
        .map(|d| Json(d.body.clone()))
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, "Event not found".to_string()))
}

async fn refresh_cache(State(state): State<Shared>) -> Result<Json<Value>, ApiError> {
    state.invalidate().await;
    let docs = state.docs().await?;
    info!(count = docs.len(), "Cache refreshed");
    Ok(Json(json!({ "status": "refreshed", "events": docs.len() })))
}

pub fn router(state: Shared) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/venues/events/all", get(all_events))
        .route("/api/v1/events", get(list_events))
        .route("/api/v1/events/{id}", get(event_by_id))
        .route("/api/v1/cache/refresh", post(refresh_cache))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[instrument(level = "info", skip_all, fields(%addr, store = %store.path().display()))]
pub async fn serve(store: EventStore, addr: &str, cache_ttl: Duration) -> Result<(), Box<dyn Error>> {
    let app = router(AppState::new(store, cache_ttl));
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Debug server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
