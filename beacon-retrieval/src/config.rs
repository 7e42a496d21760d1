//! Configuration for the retrieval engine.

use serde::{Deserialize, Serialize};

use crate::error::{RetrievalError, Result};

/// How far apart the two ranking weights may be from summing to 1.0.
const WEIGHT_SUM_TOLERANCE: f32 = 1e-4;

/// Configuration parameters for the retrieval engine.
///
/// The defaults reproduce the reference ranking behavior: 0.85 semantic /
/// 0.15 geographic weighting, a 50 km proximity radius, and 3x candidate
/// over-fetch ahead of geographic re-ranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Weight of semantic similarity in the final score.
    pub semantic_weight: f32,
    /// Weight of geographic proximity in the final score. Must sum to 1.0
    /// with `semantic_weight`.
    pub geographic_weight: f32,
    /// Distance at which geographic proximity decays to zero, in km.
    pub max_distance_km: f64,
    /// Semantic candidates fetched per requested result, so geography can
    /// promote a semantically weaker but closer match without losing it to
    /// truncation.
    pub overfetch_factor: usize,
    /// Default result count for resource searches.
    pub resource_top_k: usize,
    /// Default result count for guidance searches.
    pub guidance_top_k: usize,
    /// Regional qualifier appended to geocode queries that lack a region
    /// token, e.g. `"New Jersey"`.
    pub region_qualifier: Option<String>,
    /// Lowercase tokens that mark a location string as already qualified,
    /// e.g. `["nj", "new jersey"]`.
    pub region_tokens: Vec<String>,
    /// Bound on a single geocode lookup before it degrades to unresolved.
    pub geocode_timeout_secs: u64,
    /// Minimum spacing between outbound geocode requests, process-wide.
    /// The upstream service enforces this quota; violating it risks a ban.
    pub geocode_min_interval_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.85,
            geographic_weight: 0.15,
            max_distance_km: 50.0,
            overfetch_factor: 3,
            resource_top_k: 5,
            guidance_top_k: 3,
            region_qualifier: None,
            region_tokens: Vec::new(),
            geocode_timeout_secs: 10,
            geocode_min_interval_ms: 1000,
        }
    }
}

impl RetrievalConfig {
    /// Create a new builder for constructing a [`RetrievalConfig`].
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::default()
    }

    /// Validate parameter consistency.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if:
    /// - the weights do not sum to 1.0 or fall outside [0, 1]
    /// - `max_distance_km` is not positive and finite
    /// - `overfetch_factor` is zero
    /// - either default top-k is zero
    pub fn validate(&self) -> Result<()> {
        for (name, w) in
            [("semantic_weight", self.semantic_weight), ("geographic_weight", self.geographic_weight)]
        {
            if !(0.0..=1.0).contains(&w) {
                return Err(RetrievalError::Config(format!("{name} ({w}) must be within [0, 1]")));
            }
        }
        let sum = self.semantic_weight + self.geographic_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(RetrievalError::Config(format!(
                "semantic_weight + geographic_weight must sum to 1.0, got {sum}"
            )));
        }
        if !self.max_distance_km.is_finite() || self.max_distance_km <= 0.0 {
            return Err(RetrievalError::Config(format!(
                "max_distance_km ({}) must be positive",
                self.max_distance_km
            )));
        }
        if self.overfetch_factor == 0 {
            return Err(RetrievalError::Config("overfetch_factor must be at least 1".into()));
        }
        if self.resource_top_k == 0 || self.guidance_top_k == 0 {
            return Err(RetrievalError::Config("default top-k values must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RetrievalConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfigBuilder {
    config: RetrievalConfig,
}

impl RetrievalConfigBuilder {
    /// Set both ranking weights. They must sum to 1.0.
    pub fn weights(mut self, semantic: f32, geographic: f32) -> Self {
        self.config.semantic_weight = semantic;
        self.config.geographic_weight = geographic;
        self
    }

    /// Set the distance at which geographic proximity decays to zero.
    pub fn max_distance_km(mut self, km: f64) -> Self {
        self.config.max_distance_km = km;
        self
    }

    /// Set the semantic over-fetch multiplier.
    pub fn overfetch_factor(mut self, factor: usize) -> Self {
        self.config.overfetch_factor = factor;
        self
    }

    /// Set the default result count for resource searches.
    pub fn resource_top_k(mut self, k: usize) -> Self {
        self.config.resource_top_k = k;
        self
    }

    /// Set the default result count for guidance searches.
    pub fn guidance_top_k(mut self, k: usize) -> Self {
        self.config.guidance_top_k = k;
        self
    }

    /// Set the regional qualifier and the tokens that suppress it.
    pub fn region(mut self, qualifier: impl Into<String>, tokens: Vec<String>) -> Self {
        self.config.region_qualifier = Some(qualifier.into());
        self.config.region_tokens = tokens.into_iter().map(|t| t.to_lowercase()).collect();
        self
    }

    /// Set the geocode lookup timeout in seconds.
    pub fn geocode_timeout_secs(mut self, secs: u64) -> Self {
        self.config.geocode_timeout_secs = secs;
        self
    }

    /// Set the minimum spacing between outbound geocode requests.
    pub fn geocode_min_interval_ms(mut self, ms: u64) -> Self {
        self.config.geocode_min_interval_ms = ms;
        self
    }

    /// Build the [`RetrievalConfig`], validating parameter consistency.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] on any violation listed in
    /// [`RetrievalConfig::validate`].
    pub fn build(self) -> Result<RetrievalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RetrievalConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let err = RetrievalConfig::builder().weights(0.9, 0.2).build().unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));
    }

    #[test]
    fn rejects_out_of_range_weight() {
        assert!(RetrievalConfig::builder().weights(1.3, -0.3).build().is_err());
    }

    #[test]
    fn rejects_zero_overfetch_and_zero_k() {
        assert!(RetrievalConfig::builder().overfetch_factor(0).build().is_err());
        assert!(RetrievalConfig::builder().resource_top_k(0).build().is_err());
    }

    #[test]
    fn rejects_nonpositive_radius() {
        assert!(RetrievalConfig::builder().max_distance_km(0.0).build().is_err());
        assert!(RetrievalConfig::builder().max_distance_km(f64::NAN).build().is_err());
    }

    #[test]
    fn custom_weights_accepted() {
        let config = RetrievalConfig::builder().weights(0.7, 0.3).build().unwrap();
        assert_eq!(config.semantic_weight, 0.7);
        assert_eq!(config.geographic_weight, 0.3);
    }
}
