//! Error types for the `beacon-retrieval` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building or querying resource catalogs.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// An error occurred during embedding generation.
    #[error("embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A catalog failed to build. The catalog is not published; a later
    /// request for the same key retries the build.
    #[error("catalog '{catalog}' failed to build: {message}")]
    Build {
        /// The catalog key whose build failed.
        catalog: String,
        /// A description of the failure.
        message: String,
    },

    /// The requested catalog key has no registered source.
    #[error("no resources available for catalog key '{0}'")]
    UnknownCatalog(String),

    /// An organization or category token failed validation.
    #[error("invalid catalog key: {0}")]
    InvalidKey(String),

    /// A configuration validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A filesystem error while reading catalog sources or the embedding cache.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;
