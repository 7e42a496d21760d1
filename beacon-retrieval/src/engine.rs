//! The retrieval engine orchestrator.
//!
//! [`RetrievalEngine`] composes the embedding provider, the catalog store,
//! and the cached geocoder into the two operations the serving layer
//! calls: [`search_resources`](RetrievalEngine::search_resources) and
//! [`search_guidance`](RetrievalEngine::search_guidance). It knows nothing
//! about HTTP, sessions, or the LLM that consumes its output.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use beacon_retrieval::{RetrievalEngine, RetrievalConfig, NominatimGeocoder};
//!
//! let engine = RetrievalEngine::builder()
//!     .config(RetrievalConfig::default())
//!     .embedding_provider(Arc::new(embedder))
//!     .geocoder(Arc::new(NominatimGeocoder::new()))
//!     .cache_dir("var/embeddings")
//!     .resource_catalog("cspnj", "data/cspnj_resources.csv")?
//!     .guidance_catalog("crisis", "data/guidance/crisis")?
//!     .build()?;
//!
//! let results = engine
//!     .search_resources("I need food for my family", "cspnj", Some("Newark"), None)
//!     .await?;
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::{CatalogKey, CatalogSource};
use crate::config::RetrievalConfig;
use crate::document::{GeoPoint, ScoredResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RetrievalError, Result};
use crate::geocode::{CachedGeocoder, Geocoder};
use crate::ranker;
use crate::scoring;
use crate::store::CatalogStore;

/// The geography-aware hybrid retrieval engine.
///
/// Construct one via [`RetrievalEngine::builder()`] at process start and
/// share it; every piece of state it holds is safe for concurrent callers.
pub struct RetrievalEngine {
    config: RetrievalConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: CatalogStore,
    geocoder: Option<CachedGeocoder>,
}

impl RetrievalEngine {
    /// Create a new [`RetrievalEngineBuilder`].
    pub fn builder() -> RetrievalEngineBuilder {
        RetrievalEngineBuilder::default()
    }

    /// The engine's configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Search an organization's resource catalog.
    ///
    /// Embeds the query, over-fetches semantic candidates so geography can
    /// promote a closer match past truncation, resolves the location (if
    /// any) through the cached geocoder, blends the two scores, and
    /// returns the top `k` (default from config) by descending final
    /// score.
    ///
    /// A valid organization always yields a (possibly empty) ranked list.
    /// Geocoding failures never surface here; they degrade to ranking
    /// without geography.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::InvalidKey`] / [`RetrievalError::UnknownCatalog`]
    ///   for a malformed or unregistered organization.
    /// - [`RetrievalError::Build`] when the catalog's first build fails.
    /// - [`RetrievalError::Embedding`] when the query cannot be embedded.
    pub async fn search_resources(
        &self,
        query: &str,
        organization: &str,
        location: Option<&str>,
        k: Option<usize>,
    ) -> Result<Vec<ScoredResult>> {
        let key = CatalogKey::resources(organization)?;
        let catalog = self.store.get(&key).await?;
        let k = k.unwrap_or(self.config.resource_top_k);
        if k == 0 || catalog.documents.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).await?;
        let fetch = k.saturating_mul(self.config.overfetch_factor);
        let hits = catalog.index.search(&query_vector, fetch);

        // A stale or mismatched index may point past the document list;
        // those candidates are dropped, not fatal.
        let total = hits.len();
        let hits: Vec<_> =
            hits.into_iter().filter(|hit| hit.position < catalog.documents.len()).collect();
        if hits.len() < total {
            debug!(catalog = %key, dropped = total - hits.len(), "dropped out-of-range candidates");
        }

        let user_point = match location {
            Some(location) => self.resolve_location(location).await,
            None => None,
        };

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let document = &catalog.documents[hit.position];
            let semantic_score = scoring::semantic_similarity(hit.distance);
            let geo = scoring::geographic_score(
                user_point.as_ref(),
                document.location.as_ref(),
                document.is_virtual,
                self.config.max_distance_km,
            );
            results.push(ScoredResult {
                document: document.clone(),
                semantic_score,
                geographic_score: geo.score,
                final_score: ranker::final_score(
                    self.config.semantic_weight,
                    self.config.geographic_weight,
                    semantic_score,
                    geo.score,
                ),
                distance_km: geo.distance_km,
                is_virtual: document.is_virtual,
            });
        }

        let ranked = ranker::rank(results, k);
        info!(
            catalog = %key,
            requested = k,
            returned = ranked.len(),
            located = user_point.is_some(),
            "resource search completed"
        );
        Ok(ranked)
    }

    /// Search a guidance category, semantic-only.
    ///
    /// Returns the top `k` (default from config) document texts.
    ///
    /// # Errors
    ///
    /// Same classes as [`search_resources`](RetrievalEngine::search_resources).
    pub async fn search_guidance(
        &self,
        query: &str,
        category: &str,
        k: Option<usize>,
    ) -> Result<Vec<String>> {
        let key = CatalogKey::guidance(category)?;
        let catalog = self.store.get(&key).await?;
        let k = k.unwrap_or(self.config.guidance_top_k);
        if k == 0 || catalog.documents.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).await?;
        let texts: Vec<String> = catalog
            .index
            .search(&query_vector, k)
            .into_iter()
            .filter(|hit| hit.position < catalog.documents.len())
            .map(|hit| catalog.documents[hit.position].text.clone())
            .collect();

        info!(catalog = %key, returned = texts.len(), "guidance search completed");
        Ok(texts)
    }

    /// Build every registered catalog now instead of on first query.
    ///
    /// The CLI's offline build step; also useful at server startup to move
    /// the build cost out of the first request.
    ///
    /// # Errors
    ///
    /// Propagates the first [`RetrievalError::Build`] encountered.
    pub async fn warm(&self) -> Result<()> {
        for key in self.store.keys() {
            let catalog = self.store.get(key).await?;
            info!(catalog = %key, documents = catalog.documents.len(), "catalog ready");
        }
        Ok(())
    }

    async fn resolve_location(&self, location: &str) -> Option<GeoPoint> {
        match &self.geocoder {
            Some(geocoder) => geocoder.resolve(location).await,
            None => {
                debug!("no geocoder configured, skipping location resolution");
                None
            }
        }
    }
}

/// Builder for constructing a [`RetrievalEngine`].
///
/// The embedding provider is required; the geocoder is optional (without
/// one, location strings resolve to nothing and ranking falls back to the
/// virtual-resource boost); the config defaults to the reference weights.
#[derive(Default)]
pub struct RetrievalEngineBuilder {
    config: Option<RetrievalConfig>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    geocoder: Option<Arc<dyn Geocoder>>,
    cache_dir: Option<PathBuf>,
    sources: HashMap<CatalogKey, CatalogSource>,
}

impl RetrievalEngineBuilder {
    /// Set the engine configuration.
    pub fn config(mut self, config: RetrievalConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set an optional geocoder for location-aware ranking.
    pub fn geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    /// Directory for persisted embedding caches. Without one, every build
    /// re-embeds its documents.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Register an organization's resource CSV.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidKey`] for a malformed organization
    /// token.
    pub fn resource_catalog(mut self, organization: &str, csv: impl Into<PathBuf>) -> Result<Self> {
        let key = CatalogKey::resources(organization)?;
        self.sources.insert(key, CatalogSource::ResourceCsv(csv.into()));
        Ok(self)
    }

    /// Register a guidance category's text directory.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidKey`] for a malformed category
    /// token.
    pub fn guidance_catalog(mut self, category: &str, dir: impl Into<PathBuf>) -> Result<Self> {
        let key = CatalogKey::guidance(category)?;
        self.sources.insert(key, CatalogSource::GuidanceDir(dir.into()));
        Ok(self)
    }

    /// Build the [`RetrievalEngine`], validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if the embedding provider is
    /// missing or the configuration is inconsistent.
    pub fn build(self) -> Result<RetrievalEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedder = self
            .embedder
            .ok_or_else(|| RetrievalError::Config("embedding_provider is required".into()))?;
        let store = CatalogStore::new(embedder.clone(), self.cache_dir, self.sources);
        let geocoder = self.geocoder.map(|inner| CachedGeocoder::new(inner, &config));

        Ok(RetrievalEngine { config, embedder, store, geocoder })
    }
}
