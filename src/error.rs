//! Error taxonomy for the retrieval and answer pipeline.
//!
//! Errors fall into three groups:
//!
//! | Group | Variants | Behavior |
//! |-------|----------|----------|
//! | Structural | [`Error::IndexNotFound`], [`Error::IndexCorrupt`], [`Error::DimensionMismatch`] | fatal, surfaced to the caller |
//! | Build-time | [`Error::NoVectors`] | stops the ingestion pipeline |
//! | Embedding | [`Error::Embedding`] | the embedding backend is unavailable; fatal |
//!
//! Generative backend failures are not represented here: the answer
//! composer recovers from them locally and falls back to an extractive
//! answer. "No relevant content" is not an error either; it is a regular
//! answer.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used by the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// One of the two index artifacts does not exist.
    #[error("index unavailable: {} not found (run `pagewise index` first)", path.display())]
    IndexNotFound { path: PathBuf },

    /// The index artifacts exist but cannot be used.
    #[error("index unavailable: corrupt index: {0}")]
    IndexCorrupt(String),

    /// A vector does not match the dimensionality it is compared against.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding set held no usable vector.
    #[error("no vectors found in embeddings input")]
    NoVectors,

    /// The embedding backend failed or is not available.
    #[error("embedding backend unavailable: {0}")]
    Embedding(String),

    /// A JSON pipeline artifact could not be read or parsed.
    #[error("failed to read artifact {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors that mean the index itself is unusable.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::IndexNotFound { .. } | Error::IndexCorrupt(_) | Error::DimensionMismatch { .. }
        )
    }

    pub(crate) fn embedding(err: anyhow::Error) -> Self {
        Error::Embedding(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_classification() {
        assert!(Error::IndexNotFound {
            path: PathBuf::from("x.npy")
        }
        .is_structural());
        assert!(Error::IndexCorrupt("bad".into()).is_structural());
        assert!(Error::DimensionMismatch {
            expected: 3,
            actual: 4
        }
        .is_structural());
        assert!(!Error::NoVectors.is_structural());
        assert!(!Error::Embedding("down".into()).is_structural());
    }

    #[test]
    fn test_index_errors_mention_unavailable() {
        let e = Error::IndexNotFound {
            path: PathBuf::from("ingested/index.npy"),
        };
        let msg = e.to_string();
        assert!(msg.contains("index unavailable"));
        assert!(msg.contains("ingested/index.npy"));
    }

    #[test]
    fn test_embedding_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("connection refused").context("calling embeddings API");
        let e = Error::embedding(inner);
        let msg = e.to_string();
        assert!(msg.contains("calling embeddings API"));
        assert!(msg.contains("connection refused"));
    }
}
