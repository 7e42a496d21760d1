//! Geocoding: resolve free-text locations to coordinates.
//!
//! The [`Geocoder`] trait abstracts the external lookup service.
//! [`NominatimGeocoder`] talks to an OSM-Nominatim-style HTTP endpoint.
//! [`CachedGeocoder`] wraps any geocoder with the behavior the retrieval
//! engine relies on: normalized memoization, a process-wide request gate,
//! a bounded timeout, and regional query qualification.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::document::GeoPoint;

/// Failure classes for an outbound geocode lookup.
///
/// All of these fold to "location unresolved" for the retrieval caller,
/// but they are logged distinctly for diagnosis.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// The lookup exceeded its time bound.
    #[error("geocode lookup timed out")]
    Timeout,

    /// The request could not be sent or the response could not be read.
    #[error("geocode transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("geocode service returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for the log.
        message: String,
    },
}

/// An external service resolving free-text locations to coordinates.
///
/// `Ok(None)` means the service answered but found no match for the query.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve a location string to a coordinate pair.
    async fn geocode(&self, location: &str) -> std::result::Result<Option<GeoPoint>, GeocodeError>;
}

// ── Nominatim HTTP client ──────────────────────────────────────────

/// Default public Nominatim endpoint.
const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Nominatim's usage policy requires an identifying User-Agent.
const DEFAULT_USER_AGENT: &str = "beacon-retrieval/0.1 (+https://github.com/beacon-nav/beacon)";

/// A [`Geocoder`] backed by an OSM-Nominatim-style `/search` endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use beacon_retrieval::geocode::{Geocoder, NominatimGeocoder};
///
/// let geocoder = NominatimGeocoder::new();
/// let point = geocoder.geocode("Newark, New Jersey").await?;
/// ```
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl NominatimGeocoder {
    /// Create a client for the public Nominatim endpoint.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.into(),
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }

    /// Point the client at a different Nominatim-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the User-Agent sent with every request.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Nominatim returns coordinates as strings.
#[derive(Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, location: &str) -> std::result::Result<Option<GeoPoint>, GeocodeError> {
        debug!(location, "dispatching geocode request");

        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("q", location), ("format", "jsonv2"), ("limit", "1")])
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeocodeError::Timeout
                } else {
                    GeocodeError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Status { status, message });
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .map_err(|e| GeocodeError::Transport(format!("malformed response: {e}")))?;

        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };

        let latitude = place
            .lat
            .parse::<f64>()
            .map_err(|e| GeocodeError::Transport(format!("malformed latitude '{}': {e}", place.lat)))?;
        let longitude = place
            .lon
            .parse::<f64>()
            .map_err(|e| GeocodeError::Transport(format!("malformed longitude '{}': {e}", place.lon)))?;

        Ok(Some(GeoPoint::new(latitude, longitude)))
    }
}

// ── Caching / rate-limiting wrapper ────────────────────────────────

/// Caches successful lookups and spaces outbound requests.
///
/// - Cache keys are normalized (trimmed, lowercased), so `"Newark"` and
///   `" NEWARK "` share one entry and one outbound request. The cache
///   grows for the life of the process with no eviction; location strings
///   are low-cardinality city/zip names, so this is a documented
///   scalability limit rather than a leak in practice.
/// - Only successes are cached. A timeout or transport error is retried
///   on the next query for the same string.
/// - Outbound requests pass through a process-wide gate that enforces the
///   configured minimum spacing. The upstream quota makes this a
///   correctness requirement, not a tuning knob.
/// - Each lookup is bounded by the configured timeout and degrades to
///   unresolved instead of hanging the request.
/// - When a regional qualifier is configured and the input contains none
///   of the region tokens, the qualifier is appended to the outbound
///   query only; the cache key stays unqualified.
pub struct CachedGeocoder {
    inner: Arc<dyn Geocoder>,
    cache: RwLock<HashMap<String, GeoPoint>>,
    gate: Mutex<Option<Instant>>,
    min_interval: Duration,
    timeout: Duration,
    region_qualifier: Option<String>,
    region_tokens: Vec<String>,
}

impl CachedGeocoder {
    /// Wrap a geocoder with the caching and pacing policy from `config`.
    pub fn new(inner: Arc<dyn Geocoder>, config: &RetrievalConfig) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
            gate: Mutex::new(None),
            min_interval: Duration::from_millis(config.geocode_min_interval_ms),
            timeout: Duration::from_secs(config.geocode_timeout_secs),
            region_qualifier: config.region_qualifier.clone(),
            region_tokens: config.region_tokens.clone(),
        }
    }

    /// Resolve a location, consulting the cache first.
    ///
    /// Never fails: every failure class folds to `None` after a distinct
    /// log line, and ranking proceeds without geography.
    pub async fn resolve(&self, location: &str) -> Option<GeoPoint> {
        let key = normalize(location);
        if key.is_empty() {
            debug!("empty location string, skipping geocode");
            return None;
        }

        if let Some(point) = self.cache.read().await.get(&key) {
            debug!(location = %key, "geocode cache hit");
            return Some(*point);
        }

        let query = self.qualified_query(location);

        let mut gate = self.gate.lock().await;
        if let Some(last) = *gate {
            let since = last.elapsed();
            if since < self.min_interval {
                tokio::time::sleep(self.min_interval - since).await;
            }
        }
        // Another caller may have resolved the same string while we waited
        // for the gate.
        if let Some(point) = self.cache.read().await.get(&key) {
            return Some(*point);
        }
        let outcome = tokio::time::timeout(self.timeout, self.inner.geocode(&query)).await;
        *gate = Some(Instant::now());
        drop(gate);

        match outcome {
            Err(_) => {
                warn!(location = %key, timeout = ?self.timeout, "geocode lookup timed out");
                None
            }
            Ok(Err(GeocodeError::Timeout)) => {
                warn!(location = %key, "geocode lookup timed out upstream");
                None
            }
            Ok(Err(GeocodeError::Transport(message))) => {
                warn!(location = %key, %message, "geocode transport error");
                None
            }
            Ok(Err(GeocodeError::Status { status, message })) => {
                warn!(location = %key, status, %message, "geocode service error");
                None
            }
            Ok(Ok(None)) => {
                debug!(location = %key, "no geocode match");
                None
            }
            Ok(Ok(Some(point))) => {
                if !point.is_valid() {
                    warn!(
                        location = %key,
                        latitude = point.latitude,
                        longitude = point.longitude,
                        "geocoder returned out-of-range coordinates"
                    );
                    return None;
                }
                self.cache.write().await.insert(key, point);
                Some(point)
            }
        }
    }

    /// Append the regional qualifier unless the input already names the region.
    fn qualified_query(&self, location: &str) -> String {
        let trimmed = location.trim();
        let lowered = trimmed.to_lowercase();
        match &self.region_qualifier {
            Some(qualifier) if !self.region_tokens.iter().any(|t| lowered.contains(t)) => {
                format!("{trimmed}, {qualifier}")
            }
            _ => trimmed.to_string(),
        }
    }
}

/// Cache-key normalization: trim and lowercase.
fn normalize(location: &str) -> String {
    location.trim().to_lowercase()
}
