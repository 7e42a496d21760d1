//! Process-wide catalog store with guarded lazy builds.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::catalog::{Catalog, CatalogKey, CatalogSource};
use crate::embedding::EmbeddingProvider;
use crate::error::{RetrievalError, Result};
use crate::ingest;

/// Holds every registered catalog for the life of the process.
///
/// Catalogs build lazily on first access. The first caller for a key runs
/// the (blocking, potentially slow) build; concurrent callers for the same
/// key await that same build rather than starting their own. A failed
/// build publishes nothing, so the next request retries it. Once built, a
/// catalog is immutable and shared.
///
/// This is an explicit context object passed by reference from the engine;
/// there is no module-level global to mutate.
pub struct CatalogStore {
    embedder: Arc<dyn EmbeddingProvider>,
    cache_dir: Option<PathBuf>,
    sources: HashMap<CatalogKey, CatalogSource>,
    cells: Mutex<HashMap<CatalogKey, Arc<OnceCell<Arc<Catalog>>>>>,
}

impl CatalogStore {
    /// Create a store over the registered sources.
    pub(crate) fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        cache_dir: Option<PathBuf>,
        sources: HashMap<CatalogKey, CatalogSource>,
    ) -> Self {
        Self { embedder, cache_dir, sources, cells: Mutex::new(HashMap::new()) }
    }

    /// Every registered catalog key.
    pub fn keys(&self) -> impl Iterator<Item = &CatalogKey> {
        self.sources.keys()
    }

    /// Fetch a catalog, building it on first access.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::UnknownCatalog`] when no source is registered
    ///   for the key.
    /// - [`RetrievalError::Build`] when the first build fails; the failure
    ///   is not cached and a later call retries.
    pub async fn get(&self, key: &CatalogKey) -> Result<Arc<Catalog>> {
        let source = self
            .sources
            .get(key)
            .ok_or_else(|| RetrievalError::UnknownCatalog(key.to_string()))?;

        let cell = {
            let mut cells = self.cells.lock().await;
            cells.entry(key.clone()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        let catalog = cell
            .get_or_try_init(|| async {
                debug!(catalog = %key, "building catalog");
                ingest::build_catalog(key, source, self.embedder.as_ref(), self.cache_dir.as_deref())
                    .await
                    .map(Arc::new)
            })
            .await?;

        Ok(catalog.clone())
    }
}
