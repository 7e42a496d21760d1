//! Catalog keys, sources, and the built catalog record.
//!
//! A catalog is one organization's resource listing (`resource_<org>`) or
//! one guidance category (`cat_<category>`). Keys are validated at the
//! boundary so unknown or malformed identifiers are rejected before any
//! lookup happens.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::{RetrievalError, Result};
use crate::index::VectorIndex;

/// Which kind of document set a catalog holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    /// Resource listings for one organization.
    Resources,
    /// Guidance text for one category.
    Guidance,
}

/// A validated catalog key: `resource_<org>` or `cat_<category>`.
///
/// Tokens are lowercased on construction and must match `[a-z0-9_]+`, so
/// `CatalogKey::resources("CSPNJ")` and `CatalogKey::resources("cspnj")`
/// name the same catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogKey(String);

const RESOURCE_PREFIX: &str = "resource_";
const GUIDANCE_PREFIX: &str = "cat_";

impl CatalogKey {
    /// Key for an organization's resource catalog.
    pub fn resources(org: &str) -> Result<Self> {
        let token = validate_token(org)?;
        Ok(Self(format!("{RESOURCE_PREFIX}{token}")))
    }

    /// Key for a guidance category catalog.
    pub fn guidance(category: &str) -> Result<Self> {
        let token = validate_token(category)?;
        Ok(Self(format!("{GUIDANCE_PREFIX}{token}")))
    }

    /// The full key string, e.g. `resource_cspnj`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Which kind of catalog this key names.
    pub fn kind(&self) -> CatalogKind {
        if self.0.starts_with(RESOURCE_PREFIX) {
            CatalogKind::Resources
        } else {
            CatalogKind::Guidance
        }
    }
}

impl std::fmt::Display for CatalogKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase and validate an org/category token.
fn validate_token(raw: &str) -> Result<String> {
    let token = raw.trim().to_ascii_lowercase();
    if token.is_empty() {
        return Err(RetrievalError::InvalidKey("empty organization/category token".into()));
    }
    if !token.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(RetrievalError::InvalidKey(format!(
            "token '{raw}' contains characters outside [a-z0-9_]"
        )));
    }
    Ok(token)
}

/// Where a catalog's documents come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogSource {
    /// A CSV of resource rows: service, description, url, phone,
    /// optional latitude/longitude, optional virtual flag.
    ResourceCsv(PathBuf),
    /// A directory of plain-text guidance files, one document per file.
    GuidanceDir(PathBuf),
}

/// A built, read-only catalog: the document list and the index over its
/// embeddings. Vector `i` of the index embeds document `i`.
#[derive(Debug)]
pub struct Catalog {
    /// Documents in source order.
    pub documents: Vec<Document>,
    /// Flat L2 index over the documents' embeddings.
    pub index: VectorIndex,
}
