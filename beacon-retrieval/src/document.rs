//! Data types for documents, coordinates, and scored results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in decimal degrees, valid range [-90, 90].
    pub latitude: f64,
    /// Longitude in decimal degrees, valid range [-180, 180].
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new coordinate pair.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Whether both components are finite and within coordinate range.
    ///
    /// Malformed coordinates never reach distance math; scoring treats
    /// them the same as a missing coordinate.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// One retrievable unit of text: a resource listing or a guidance snippet.
///
/// Documents are immutable once built into a catalog; the authoritative
/// source is the CSV or guidance file, and rebuilding is the only mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable identifier, unique within its catalog.
    pub id: String,
    /// Display text, returned to the caller and used for embedding context.
    pub text: String,
    /// Key-value metadata (service name, url, phone, ...).
    pub metadata: HashMap<String, String>,
    /// Resolved coordinate of the resource, if the source listed one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    /// True for resources available regardless of user location (hotlines,
    /// statewide/online services).
    pub is_virtual: bool,
}

/// A ranked retrieval result for one query. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredResult {
    /// The matched document.
    pub document: Document,
    /// Semantic similarity in (0, 1], from `1 / (1 + L2 distance)`.
    pub semantic_score: f32,
    /// Geographic proximity in [0, 1].
    pub geographic_score: f32,
    /// Weighted combination of the two scores.
    pub final_score: f32,
    /// Great-circle distance from the user in km, when both coordinates
    /// resolved. `None` for virtual resources and unresolved locations.
    pub distance_km: Option<f64>,
    /// Copied from the document for callers that drop the full record.
    pub is_virtual: bool,
}
