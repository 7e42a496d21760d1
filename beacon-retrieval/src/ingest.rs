//! Index Builder: turn catalog sources into documents and embeddings.
//!
//! Resource catalogs come from CSVs (service, description, url, phone,
//! optional coordinates, optional virtual flag); guidance catalogs come
//! from directories of plain-text files, one document per file. Embedding
//! vectors are persisted next to the catalog in a per-key cache file and
//! loaded on later builds instead of re-embedding.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogKey, CatalogSource};
use crate::document::{Document, GeoPoint};
use crate::embedding::EmbeddingProvider;
use crate::error::{RetrievalError, Result};
use crate::index::VectorIndex;

/// One row of a resource CSV.
///
/// `latitude`/`longitude` and `virtual` are optional columns; empty fields
/// deserialize to `None`.
#[derive(Debug, Deserialize)]
struct ResourceRow {
    service: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default, rename = "virtual")]
    is_virtual: Option<bool>,
}

/// Documents plus the texts to embed for them, index-aligned.
struct LoadedDocuments {
    documents: Vec<Document>,
    embed_texts: Vec<String>,
}

/// On-disk embedding cache for one catalog key.
///
/// The model id and dimensionality are recorded so a provider swap is
/// caught at load time instead of silently searching the wrong space.
#[derive(Serialize, Deserialize)]
struct EmbeddingCacheFile {
    model: String,
    dimensions: usize,
    vectors: Vec<Vec<f32>>,
}

/// Build one catalog from its registered source.
///
/// # Errors
///
/// Returns [`RetrievalError::Build`] when the source is unreadable or the
/// embedding set is inconsistent with the document list (count, model, or
/// dimension mismatch). No partially-built catalog is ever returned.
pub(crate) async fn build_catalog(
    key: &CatalogKey,
    source: &CatalogSource,
    embedder: &dyn EmbeddingProvider,
    cache_dir: Option<&Path>,
) -> Result<Catalog> {
    let loaded = match source {
        CatalogSource::ResourceCsv(path) => load_resource_documents(key, path)?,
        CatalogSource::GuidanceDir(path) => load_guidance_documents(key, path)?,
    };

    if loaded.documents.is_empty() {
        info!(catalog = %key, "catalog source is empty");
        return Ok(Catalog { documents: Vec::new(), index: VectorIndex::empty(embedder.dimensions()) });
    }

    let vectors = embeddings_for(key, &loaded.embed_texts, embedder, cache_dir).await?;
    if vectors.len() != loaded.documents.len() {
        return Err(RetrievalError::Build {
            catalog: key.to_string(),
            message: format!(
                "{} embedding vectors for {} documents; delete the embedding cache and rebuild",
                vectors.len(),
                loaded.documents.len()
            ),
        });
    }

    let index = VectorIndex::from_vectors(embedder.dimensions(), vectors).map_err(|e| match e {
        RetrievalError::Build { message, .. } => {
            RetrievalError::Build { catalog: key.to_string(), message }
        }
        other => other,
    })?;

    info!(catalog = %key, documents = loaded.documents.len(), "built catalog index");
    Ok(Catalog { documents: loaded.documents, index })
}

/// Parse a resource CSV into documents.
fn load_resource_documents(key: &CatalogKey, path: &Path) -> Result<LoadedDocuments> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path).map_err(|e| {
        RetrievalError::Build {
            catalog: key.to_string(),
            message: format!("failed to open CSV {}: {e}", path.display()),
        }
    })?;

    let mut documents = Vec::new();
    let mut embed_texts = Vec::new();

    for (row_index, row) in reader.deserialize::<ResourceRow>().enumerate() {
        let row = row.map_err(|e| RetrievalError::Build {
            catalog: key.to_string(),
            message: format!("malformed CSV row {}: {e}", row_index + 1),
        })?;

        let location = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => {
                let point = GeoPoint::new(latitude, longitude);
                if point.is_valid() {
                    Some(point)
                } else {
                    warn!(
                        catalog = %key,
                        row = row_index + 1,
                        latitude,
                        longitude,
                        "coordinates out of range, treating as missing"
                    );
                    None
                }
            }
            (None, None) => None,
            _ => {
                warn!(
                    catalog = %key,
                    row = row_index + 1,
                    "only one of latitude/longitude present, treating as missing"
                );
                None
            }
        };

        let mut metadata = HashMap::new();
        metadata.insert("service".to_string(), row.service.clone());
        metadata.insert("url".to_string(), row.url.clone());
        metadata.insert("phone".to_string(), row.phone.clone());

        embed_texts.push(format!("{}: {}", row.service, row.description));
        documents.push(Document {
            id: format!("{key}_{row_index}"),
            text: format!(
                "Resource: {}, Desc: {}, Phone: {}, URL: {}",
                row.service, row.description, row.phone, row.url
            ),
            metadata,
            location,
            is_virtual: row.is_virtual.unwrap_or(false),
        });
    }

    Ok(LoadedDocuments { documents, embed_texts })
}

/// Read a guidance directory: one document per `.txt` file, in file-name
/// order so rebuilds are deterministic.
fn load_guidance_documents(key: &CatalogKey, dir: &Path) -> Result<LoadedDocuments> {
    let entries = fs::read_dir(dir)
        .map_err(|source| RetrievalError::Io { path: dir.to_path_buf(), source })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort();

    let mut documents = Vec::new();
    let mut embed_texts = Vec::new();

    for (doc_index, path) in paths.iter().enumerate() {
        let content = fs::read_to_string(path)
            .map_err(|source| RetrievalError::Io { path: path.clone(), source })?;
        let content = content.trim_end();
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("article_{doc_index}"));

        let mut metadata = HashMap::new();
        metadata.insert("title".to_string(), title.clone());

        embed_texts.push(format!("{title}\n{content}"));
        documents.push(Document {
            id: format!("{key}_{doc_index}"),
            text: format!("Article: {title}\n{content}"),
            metadata,
            location: None,
            is_virtual: false,
        });
    }

    Ok(LoadedDocuments { documents, embed_texts })
}

/// Cache file path for one catalog key.
fn cache_path(cache_dir: &Path, key: &CatalogKey) -> PathBuf {
    cache_dir.join(format!("{key}.embeddings.json"))
}

/// Load the persisted embeddings for a key, or embed and persist them.
///
/// A present cache file is used as-is: there is no staleness check against
/// the source file, so editing a source without deleting its cache serves
/// stale vectors of the same count. Deleting the file forces a re-embed.
async fn embeddings_for(
    key: &CatalogKey,
    texts: &[String],
    embedder: &dyn EmbeddingProvider,
    cache_dir: Option<&Path>,
) -> Result<Vec<Vec<f32>>> {
    if let Some(dir) = cache_dir {
        let path = cache_path(dir, key);
        if path.exists() {
            let bytes =
                fs::read(&path).map_err(|source| RetrievalError::Io { path: path.clone(), source })?;
            let cache: EmbeddingCacheFile = serde_json::from_slice(&bytes).map_err(|e| {
                RetrievalError::Build {
                    catalog: key.to_string(),
                    message: format!("embedding cache {} is corrupt: {e}", path.display()),
                }
            })?;
            if cache.model != embedder.model_id() {
                return Err(RetrievalError::Build {
                    catalog: key.to_string(),
                    message: format!(
                        "embedding cache was written by model '{}' but the provider is '{}'; delete {} to rebuild",
                        cache.model,
                        embedder.model_id(),
                        path.display()
                    ),
                });
            }
            if cache.dimensions != embedder.dimensions() {
                return Err(RetrievalError::Build {
                    catalog: key.to_string(),
                    message: format!(
                        "embedding cache has {} dimensions but the provider produces {}; delete {} to rebuild",
                        cache.dimensions,
                        embedder.dimensions(),
                        path.display()
                    ),
                });
            }
            info!(catalog = %key, vectors = cache.vectors.len(), "loaded embedding cache");
            return Ok(cache.vectors);
        }
    }

    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let vectors = embedder.embed_batch(&refs).await?;
    if vectors.len() != texts.len() {
        return Err(RetrievalError::Build {
            catalog: key.to_string(),
            message: format!(
                "provider returned {} vectors for {} documents",
                vectors.len(),
                texts.len()
            ),
        });
    }

    if let Some(dir) = cache_dir {
        fs::create_dir_all(dir)
            .map_err(|source| RetrievalError::Io { path: dir.to_path_buf(), source })?;
        let path = cache_path(dir, key);
        let cache = EmbeddingCacheFile {
            model: embedder.model_id().to_string(),
            dimensions: embedder.dimensions(),
            vectors,
        };
        let bytes = serde_json::to_vec(&cache).map_err(|e| RetrievalError::Build {
            catalog: key.to_string(),
            message: format!("failed to serialize embedding cache: {e}"),
        })?;
        fs::write(&path, bytes)
            .map_err(|source| RetrievalError::Io { path: path.clone(), source })?;
        info!(catalog = %key, path = %path.display(), "wrote embedding cache");
        return Ok(cache.vectors);
    }

    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Deterministic embedder: folds bytes into a fixed-dimension vector.
    struct StubEmbedder {
        dims: usize,
        calls: AtomicUsize,
    }

    impl StubEmbedder {
        fn new(dims: usize) -> Self {
            Self { dims, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut vector = vec![0.0f32; self.dims];
            for (i, byte) in text.bytes().enumerate() {
                vector[i % self.dims] += f32::from(byte) / 255.0;
            }
            Ok(vector)
        }

        fn dimensions(&self) -> usize {
            self.dims
        }

        fn model_id(&self) -> &str {
            "stub-embedder-v1"
        }
    }

    fn write_csv(dir: &Path, rows: &[&str]) -> PathBuf {
        let path = dir.join("resources.csv");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "service,description,url,phone,latitude,longitude,virtual").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        path
    }

    #[tokio::test]
    async fn csv_rows_become_documents_with_original_formats() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            &[
                "Food Bank,groceries weekly,https://fb.example,555-0100,40.7,-74.1,",
                "Crisis Line,hotline,https://cl.example,988,,,true",
            ],
        );
        let key = CatalogKey::resources("cspnj").unwrap();
        let embedder = StubEmbedder::new(4);

        let catalog =
            build_catalog(&key, &CatalogSource::ResourceCsv(path), &embedder, None).await.unwrap();

        assert_eq!(catalog.documents.len(), 2);
        assert_eq!(catalog.index.len(), 2);

        let food = &catalog.documents[0];
        assert_eq!(food.id, "resource_cspnj_0");
        assert_eq!(
            food.text,
            "Resource: Food Bank, Desc: groceries weekly, Phone: 555-0100, URL: https://fb.example"
        );
        assert_eq!(food.metadata["phone"], "555-0100");
        assert_eq!(food.location, Some(GeoPoint::new(40.7, -74.1)));
        assert!(!food.is_virtual);

        let crisis = &catalog.documents[1];
        assert!(crisis.is_virtual);
        assert_eq!(crisis.location, None);
    }

    #[tokio::test]
    async fn partial_or_invalid_coordinates_treated_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            &[
                "Only Lat,desc,,555,40.7,,",
                "Bad Range,desc,,555,95.0,-74.1,",
            ],
        );
        let key = CatalogKey::resources("cspnj").unwrap();
        let embedder = StubEmbedder::new(4);

        let catalog =
            build_catalog(&key, &CatalogSource::ResourceCsv(path), &embedder, None).await.unwrap();
        assert!(catalog.documents.iter().all(|d| d.location.is_none()));
    }

    #[tokio::test]
    async fn second_build_loads_cache_without_re_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let path = write_csv(dir.path(), &["Food Bank,groceries,,555,,,"]);
        let key = CatalogKey::resources("cspnj").unwrap();
        let source = CatalogSource::ResourceCsv(path);

        let first = StubEmbedder::new(4);
        let built = build_catalog(&key, &source, &first, Some(&cache_dir)).await.unwrap();
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);

        let second = StubEmbedder::new(4);
        let rebuilt = build_catalog(&key, &source, &second, Some(&cache_dir)).await.unwrap();
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
        assert_eq!(built.documents, rebuilt.documents);
    }

    #[tokio::test]
    async fn stale_cache_with_wrong_count_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        fs::create_dir_all(&cache_dir).unwrap();
        let key = CatalogKey::resources("cspnj").unwrap();

        // Ten rows in the source, nine vectors in the cache.
        let rows: Vec<String> =
            (0..10).map(|i| format!("Service {i},desc {i},,555,,,")).collect();
        let row_refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let path = write_csv(dir.path(), &row_refs);

        let stale = EmbeddingCacheFile {
            model: "stub-embedder-v1".into(),
            dimensions: 4,
            vectors: vec![vec![0.0; 4]; 9],
        };
        fs::write(cache_path(&cache_dir, &key), serde_json::to_vec(&stale).unwrap()).unwrap();

        let embedder = StubEmbedder::new(4);
        let err = build_catalog(&key, &CatalogSource::ResourceCsv(path), &embedder, Some(&cache_dir))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Build { .. }), "got {err}");
        assert!(err.to_string().contains("9 embedding vectors for 10 documents"));
    }

    #[tokio::test]
    async fn cache_from_another_model_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        fs::create_dir_all(&cache_dir).unwrap();
        let key = CatalogKey::resources("cspnj").unwrap();
        let path = write_csv(dir.path(), &["Food Bank,groceries,,555,,,"]);

        let stale = EmbeddingCacheFile {
            model: "some-other-model".into(),
            dimensions: 4,
            vectors: vec![vec![0.0; 4]],
        };
        fs::write(cache_path(&cache_dir, &key), serde_json::to_vec(&stale).unwrap()).unwrap();

        let embedder = StubEmbedder::new(4);
        let err = build_catalog(&key, &CatalogSource::ResourceCsv(path), &embedder, Some(&cache_dir))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("some-other-model"));
    }

    #[tokio::test]
    async fn guidance_directory_builds_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b_grounding.txt"), "Grounding techniques.\n").unwrap();
        fs::write(dir.path().join("a_breathing.txt"), "Box breathing.\n").unwrap();
        fs::write(dir.path().join("ignore.md"), "not text").unwrap();
        let key = CatalogKey::guidance("crisis").unwrap();
        let embedder = StubEmbedder::new(4);

        let catalog =
            build_catalog(&key, &CatalogSource::GuidanceDir(dir.path().to_path_buf()), &embedder, None)
                .await
                .unwrap();

        assert_eq!(catalog.documents.len(), 2);
        assert_eq!(catalog.documents[0].text, "Article: a_breathing\nBox breathing.");
        assert_eq!(catalog.documents[1].metadata["title"], "b_grounding");
    }

    #[tokio::test]
    async fn empty_source_builds_an_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), &[]);
        let key = CatalogKey::resources("cspnj").unwrap();
        let embedder = StubEmbedder::new(4);

        let catalog =
            build_catalog(&key, &CatalogSource::ResourceCsv(path), &embedder, None).await.unwrap();
        assert!(catalog.documents.is_empty());
        assert!(catalog.index.is_empty());
    }

    #[tokio::test]
    async fn missing_source_file_is_a_build_error() {
        let key = CatalogKey::resources("cspnj").unwrap();
        let embedder = StubEmbedder::new(4);
        let err = build_catalog(
            &key,
            &CatalogSource::ResourceCsv(PathBuf::from("/nonexistent/resources.csv")),
            &embedder,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RetrievalError::Build { .. }));
    }
}
