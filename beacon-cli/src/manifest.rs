//! The catalog manifest: which organizations and categories to serve,
//! where their sources live, and how to reach the collaborator services.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use beacon_retrieval::RetrievalConfig;

/// Deployment manifest loaded from JSON.
///
/// `resources` maps organization keys to resource CSVs; `guidance` maps
/// category keys to directories of text files. Both use `BTreeMap` so
/// batch builds run in a stable order.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogManifest {
    /// Directory for persisted embedding caches.
    pub cache_dir: PathBuf,
    /// Engine configuration; omitted fields take the reference defaults.
    #[serde(default)]
    pub config: RetrievalConfig,
    /// Organization key -> resource CSV path.
    #[serde(default)]
    pub resources: BTreeMap<String, PathBuf>,
    /// Category key -> guidance directory path.
    #[serde(default)]
    pub guidance: BTreeMap<String, PathBuf>,
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    /// Geocoder settings; omit to disable location-aware ranking.
    #[serde(default)]
    pub geocoder: Option<GeocoderSettings>,
}

/// Overrides for the embedding provider.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingSettings {
    /// Embedding model name; also the cache identity.
    pub model: Option<String>,
    /// Requested embedding dimensionality.
    pub dimensions: Option<usize>,
}

/// Overrides for the Nominatim geocoder.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeocoderSettings {
    /// Alternative Nominatim-compatible endpoint.
    pub base_url: Option<String>,
    /// User-Agent to identify this deployment to the service.
    pub user_agent: Option<String>,
}

impl CatalogManifest {
    /// Load and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let manifest =
            serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))?;
        Ok(manifest)
    }
}
