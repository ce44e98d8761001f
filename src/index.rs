//! Dense vector index: a row-normalized `N × D` matrix plus `N` positionally
//! aligned metadata records.
//!
//! The matrix is persisted as a `.npy` array and the metadata as a JSON
//! array. Row `i` always belongs to metadata record `i`; the two sequences
//! are never reordered independently.
//!
//! # Persistence
//!
//! Both artifacts are first written to temporary siblings (`*.tmp`) and then
//! renamed into place. Either file alone is never visible half-written, but
//! the two renames are not a single atomic step: a crash between them leaves
//! an old/new pair, which [`VectorIndex::load`] rejects when the row counts
//! differ. Rebuilding while queries read the same paths must be coordinated
//! by the caller (build to other paths, then swap).

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use tracing::info;

use crate::chunk::{read_json, truncate_chars, write_json};
use crate::embedding::load_embeddings;
use crate::error::{Error, Result};
use crate::models::{EmbeddedChunk, IndexMeta};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Divisor used in place of a zero norm so no row becomes NaN.
pub const NORM_EPSILON: f32 = 1e-10;

/// Locations of the two index artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    pub vectors: PathBuf,
    pub metadata: PathBuf,
}

impl IndexPaths {
    pub fn new(vectors: impl Into<PathBuf>, metadata: impl Into<PathBuf>) -> Self {
        Self {
            vectors: vectors.into(),
            metadata: metadata.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    vectors: Array2<f32>,
    meta: Vec<IndexMeta>,
}

impl VectorIndex {
    /// Build an index from embedded chunks.
    ///
    /// Chunks without an embedding (or with an empty one) are skipped. Every
    /// kept vector is scaled to unit L2 norm and its text truncated to
    /// `snippet_chars` characters in the metadata record.
    ///
    /// # Errors
    ///
    /// - [`Error::NoVectors`] if no chunk carries an embedding.
    /// - [`Error::DimensionMismatch`] if embeddings disagree on length.
    pub fn build(items: &[EmbeddedChunk], snippet_chars: usize) -> Result<Self> {
        let mut dims = None;
        let mut flat = Vec::new();
        let mut meta = Vec::new();

        for item in items {
            let vector = match item.embedding.as_deref() {
                Some(v) if !v.is_empty() => v,
                _ => continue,
            };
            let expected = *dims.get_or_insert(vector.len());
            if vector.len() != expected {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            flat.extend_from_slice(vector);
            meta.push(IndexMeta {
                chunk_id: item.chunk_id,
                page: item.page,
                kind: item.kind,
                text: truncate_chars(&item.text, snippet_chars).to_string(),
            });
        }

        let dims = dims.ok_or(Error::NoVectors)?;
        let mut vectors = Array2::from_shape_vec((meta.len(), dims), flat)
            .map_err(|e| Error::IndexCorrupt(e.to_string()))?;
        normalize_rows(&mut vectors);

        Ok(Self { vectors, meta })
    }

    /// Assemble an index from already-normalized parts, checking alignment.
    pub fn from_parts(vectors: Array2<f32>, meta: Vec<IndexMeta>) -> Result<Self> {
        if vectors.nrows() != meta.len() {
            return Err(Error::IndexCorrupt(format!(
                "matrix has {} rows but metadata has {} records",
                vectors.nrows(),
                meta.len()
            )));
        }
        if vectors.nrows() == 0 || vectors.ncols() == 0 {
            return Err(Error::IndexCorrupt(format!(
                "matrix has degenerate shape {:?}",
                vectors.dim()
            )));
        }
        Ok(Self { vectors, meta })
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn vectors(&self) -> &Array2<f32> {
        &self.vectors
    }

    pub fn meta(&self) -> &[IndexMeta] {
        &self.meta
    }

    /// Dot product of `query` against every row.
    pub fn scores(&self, query: ArrayView1<'_, f32>) -> Result<Array1<f32>> {
        if query.len() != self.dims() {
            return Err(Error::DimensionMismatch {
                expected: self.dims(),
                actual: query.len(),
            });
        }
        Ok(self.vectors.dot(&query))
    }

    /// Write both artifacts, temporaries first, then rename.
    pub fn save(&self, paths: &IndexPaths) -> Result<()> {
        let vec_tmp = tmp_path(&paths.vectors);
        let meta_tmp = tmp_path(&paths.metadata);

        ensure_parent(&paths.vectors)?;
        let mut writer = BufWriter::new(File::create(&vec_tmp)?);
        self.vectors
            .write_npy(&mut writer)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        writer.flush()?;
        write_json(&meta_tmp, &self.meta)?;

        std::fs::rename(&vec_tmp, &paths.vectors)?;
        std::fs::rename(&meta_tmp, &paths.metadata)?;

        info!(
            rows = self.len(),
            dims = self.dims(),
            index = %paths.vectors.display(),
            metadata = %paths.metadata.display(),
            "saved index"
        );
        Ok(())
    }

    /// Load and validate both artifacts.
    ///
    /// # Errors
    ///
    /// - [`Error::IndexNotFound`] if either file is missing.
    /// - [`Error::IndexCorrupt`] if either file cannot be parsed or the
    ///   row count differs from the metadata length.
    pub fn load(paths: &IndexPaths) -> Result<Self> {
        for path in [&paths.vectors, &paths.metadata] {
            if !path.exists() {
                return Err(Error::IndexNotFound { path: path.clone() });
            }
        }

        let reader = BufReader::new(File::open(&paths.vectors)?);
        let vectors = Array2::<f32>::read_npy(reader).map_err(|e| {
            Error::IndexCorrupt(format!("{}: {}", paths.vectors.display(), e))
        })?;
        let meta: Vec<IndexMeta> = match read_json(&paths.metadata) {
            Ok(meta) => meta,
            Err(Error::Artifact { path, source }) => {
                return Err(Error::IndexCorrupt(format!("{}: {}", path.display(), source)))
            }
            Err(e) => return Err(e),
        };

        Self::from_parts(vectors, meta)
    }
}

/// Scale every row to unit L2 norm; zero rows stay zero.
pub fn normalize_rows(matrix: &mut Array2<f32>) {
    for mut row in matrix.axis_iter_mut(Axis(0)) {
        let divisor = norm_divisor(row.iter());
        row.mapv_inplace(|x| (f64::from(x) / divisor) as f32);
    }
}

/// Unit-normalize a single vector, with the same zero guard as [`normalize_rows`].
pub fn normalize(vector: &mut Array1<f32>) {
    let divisor = norm_divisor(vector.iter());
    vector.mapv_inplace(|x| (f64::from(x) / divisor) as f32);
}

/// L2 norm accumulated in f64, where squares of finite f32 values neither
/// underflow nor overflow. Only an all-zero vector gets [`NORM_EPSILON`].
fn norm_divisor<'a>(values: impl Iterator<Item = &'a f32>) -> f64 {
    let norm = values
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt();
    if norm == 0.0 {
        f64::from(NORM_EPSILON)
    } else {
        norm
    }
}

/// Read `embeddings.json`, build the index, and persist it.
pub fn build_index(
    embeddings_path: &Path,
    paths: &IndexPaths,
    snippet_chars: usize,
    progress: &dyn ProgressReporter,
) -> Result<VectorIndex> {
    let items = load_embeddings(embeddings_path)?;
    let index = VectorIndex::build(&items, snippet_chars)?;
    index.save(paths)?;
    progress.report(ProgressEvent::Indexed {
        rows: index.len() as u64,
        dims: index.dims() as u64,
    });
    Ok(index)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
