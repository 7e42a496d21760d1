//! Semantic and geographic score computation.
//!
//! Both signals are mapped into [0, 1] before the ranker blends them:
//! semantic L2 distance through `1 / (1 + d)`, geographic distance through
//! a linear decay clamped at `max_distance_km`.

use crate::document::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Neutral score for resources whose proximity cannot be determined:
/// missing or malformed coordinates, or an unresolved user location.
pub const NEUTRAL_GEO_SCORE: f32 = 0.5;

/// Map an L2 distance in [0, inf) to a similarity in (0, 1].
///
/// Monotonically decreasing, always positive, 1.0 at distance 0 — safe to
/// blend with the bounded geographic score.
pub fn semantic_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Great-circle distance between two coordinates in kilometers.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// A geographic proximity score with the distance that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoScore {
    /// Proximity in [0, 1].
    pub score: f32,
    /// Resolved great-circle distance in km, when one was computed.
    pub distance_km: Option<f64>,
}

/// Score a resource's proximity to the user.
///
/// Policy, in priority order:
/// 1. virtual resource: 1.0 regardless of geometry
/// 2. no user coordinate: 0.5 (the no-location pathway keeps only the
///    virtual boost above)
/// 3. resource coordinate missing or malformed: 0.5, neutral
/// 4. otherwise `max(0, 1 - distance / max_distance_km)`
///
/// Never fails: every degenerate input folds into the neutral score so the
/// ranker always receives a bounded value.
pub fn geographic_score(
    user: Option<&GeoPoint>,
    resource: Option<&GeoPoint>,
    is_virtual: bool,
    max_distance_km: f64,
) -> GeoScore {
    if is_virtual {
        return GeoScore { score: 1.0, distance_km: None };
    }
    let Some(user) = user else {
        return GeoScore { score: NEUTRAL_GEO_SCORE, distance_km: None };
    };
    let Some(resource) = resource else {
        return GeoScore { score: NEUTRAL_GEO_SCORE, distance_km: None };
    };
    if !user.is_valid() || !resource.is_valid() || !(max_distance_km.is_finite() && max_distance_km > 0.0) {
        tracing::warn!(
            user_lat = user.latitude,
            user_lon = user.longitude,
            resource_lat = resource.latitude,
            resource_lon = resource.longitude,
            "malformed coordinates, scoring neutrally"
        );
        return GeoScore { score: NEUTRAL_GEO_SCORE, distance_km: None };
    }

    let distance_km = haversine_km(user, resource);
    let score = (1.0 - distance_km / max_distance_km).clamp(0.0, 1.0) as f32;
    GeoScore { score, distance_km: Some(distance_km) }
}
