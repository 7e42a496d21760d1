//! Geography-aware hybrid retrieval over embedded community-resource
//! catalogs.
//!
//! This crate ranks curated community resources (food banks, shelters,
//! legal aid, crisis lines) for a free-text query and an optional user
//! location by blending two signals:
//!
//! - **semantic similarity** — exact L2 nearest-neighbor search over
//!   precomputed document embeddings, mapped to (0, 1] via `1 / (1 + d)`
//! - **geographic proximity** — great-circle distance to the user's
//!   geocoded location, mapped to [0, 1] with a linear decay; virtual
//!   resources (hotlines, statewide services) always score 1.0
//!
//! The blend defaults to 0.85 semantic / 0.15 geographic. Catalogs build
//! lazily from CSV resource listings and guidance text files, persist
//! their embeddings to per-catalog cache files, and live in memory for
//! the process lifetime. Geocoding is memoized and paced to the upstream
//! service's one-request-per-second quota.
//!
//! The crate is a library: it knows nothing about HTTP, sessions, or the
//! LLM call that consumes its output. See [`RetrievalEngine`] for the
//! entry point.

pub mod catalog;
pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod geocode;
pub mod index;
mod ingest;
pub mod openai;
pub mod ranker;
pub mod render;
pub mod scoring;
mod store;

pub use catalog::{Catalog, CatalogKey, CatalogKind, CatalogSource};
pub use config::{RetrievalConfig, RetrievalConfigBuilder};
pub use document::{Document, GeoPoint, ScoredResult};
pub use embedding::EmbeddingProvider;
pub use engine::{RetrievalEngine, RetrievalEngineBuilder};
pub use error::{Result, RetrievalError};
pub use geocode::{CachedGeocoder, GeocodeError, Geocoder, NominatimGeocoder};
pub use index::{IndexHit, VectorIndex};
pub use openai::OpenAiEmbeddingProvider;
