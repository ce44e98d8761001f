//! Top-k cosine retrieval over a [`VectorIndex`].
//!
//! # Algorithm
//!
//! 1. Embed the query with the same [`Embedder`] that built the index.
//! 2. Check the query dimensionality against the index.
//! 3. Normalize the query to unit length (zero-norm guarded).
//! 4. Dot the query against every row; with unit rows this is cosine similarity.
//! 5. Sort by score descending, ties by original row order, and keep `k`.

use ndarray::Array1;
use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::index::{normalize, IndexPaths, VectorIndex};
use crate::models::Hit;

pub struct Retriever<'a> {
    embedder: &'a dyn Embedder,
    index: VectorIndex,
}

impl<'a> Retriever<'a> {
    /// Pair a loaded index with the embedder used to build it.
    ///
    /// Fails with [`Error::DimensionMismatch`] when the embedder declares a
    /// dimensionality that differs from the index.
    pub fn new(embedder: &'a dyn Embedder, index: VectorIndex) -> Result<Self> {
        let declared = embedder.dims();
        if declared != 0 && declared != index.dims() {
            return Err(Error::DimensionMismatch {
                expected: index.dims(),
                actual: declared,
            });
        }
        Ok(Self { embedder, index })
    }

    /// Load the index artifacts fresh from disk.
    pub fn open(embedder: &'a dyn Embedder, paths: &IndexPaths) -> Result<Self> {
        let index = VectorIndex::load(paths)?;
        debug!(rows = index.len(), dims = index.dims(), "loaded index");
        Self::new(embedder, index)
    }

    /// Return at most `k` hits in descending score order.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<Hit>> {
        let raw = self.embedder.embed(query).map_err(Error::embedding)?;
        let mut query_vec = Array1::from(raw);
        if query_vec.len() != self.index.dims() {
            return Err(Error::DimensionMismatch {
                expected: self.index.dims(),
                actual: query_vec.len(),
            });
        }
        normalize(&mut query_vec);

        let scores = self.index.scores(query_vec.view())?.to_vec();
        let hits: Vec<Hit> = top_k(&scores, k)
            .into_iter()
            .map(|(row, score)| Hit {
                score,
                meta: self.index.meta()[row].clone(),
            })
            .collect();

        debug!(
            k,
            returned = hits.len(),
            best = hits.first().map(|h| h.score),
            "search complete"
        );
        Ok(hits)
    }
}

/// Indices and scores of the `k` largest scores, descending; equal scores
/// keep their original order.
pub fn top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}
