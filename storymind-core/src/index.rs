//! Flat embedding index (C2).
//!
//! The teacher's `LazyIndex` builds LSH buckets and online k-means clusters
//! to keep search sub-linear over large code corpora. A single novel's
//! windows number in the low thousands at most, so brute-force L2 search
//! over a flat `Vec` is both simpler and fast enough — no cluster structure,
//! no quantization, no HNSW. What's kept from the teacher is the persistence
//! shape: a versioned sidecar file plus a model-identity check on load.
//!
//! Persistence splits across two sidecar artifacts: the vector store (at the
//! given path) and a companion `.meta` file holding the ordered window
//! texts. Both are required to reconstruct a working index; missing either
//! is `IndexCorrupt`.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::embedder::l2_distance;
use crate::error::{Result, StoryMindError};

const INDEX_STATE_VERSION: u32 = 1;

/// One embedded window: its vector and the source text it was built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub text: String,
}

/// On-disk shape of the vector-store sidecar.
#[derive(Debug, Serialize, Deserialize)]
struct VectorStore {
    version: u32,
    model_identity: String,
    vectors: Vec<Vec<f32>>,
}

/// On-disk shape of the window-text sidecar (the `.meta` file).
#[derive(Debug, Serialize, Deserialize)]
struct TextSidecar {
    texts: Vec<String>,
}

/// The companion `.meta` path for a given vector-store path.
pub fn meta_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_else(|| OsStr::new("index")).to_owned();
    name.push(".meta");
    path.with_file_name(name)
}

/// A flat, brute-force nearest-neighbor index over window embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingIndex {
    version: u32,
    model_identity: String,
    entries: Vec<IndexEntry>,
}

impl EmbeddingIndex {
    pub fn new(model_identity: impl Into<String>) -> Self {
        Self {
            version: INDEX_STATE_VERSION,
            model_identity: model_identity.into(),
            entries: Vec::new(),
        }
    }

    /// Build an index from parallel vectors and texts.
    pub fn build(model_identity: impl Into<String>, vectors: Vec<Vec<f32>>, texts: Vec<String>) -> Result<Self> {
        if vectors.len() != texts.len() {
            return Err(StoryMindError::IndexCorrupt(format!(
                "vector count ({}) does not match text count ({})",
                vectors.len(),
                texts.len()
            )));
        }
        let entries = vectors
            .into_iter()
            .zip(texts)
            .map(|(vector, text)| IndexEntry { vector, text })
            .collect();
        Ok(Self {
            version: INDEX_STATE_VERSION,
            model_identity: model_identity.into(),
            entries,
        })
    }

    pub fn push(&mut self, vector: Vec<f32>, text: String) {
        self.entries.push(IndexEntry { vector, text });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model_identity(&self) -> &str {
        &self.model_identity
    }

    /// Return the `k` nearest entries to `query` by ascending L2 distance.
    ///
    /// If `k` exceeds the number of entries, all entries are returned. An
    /// empty index returns an empty vector rather than erroring, since
    /// retrieval-empty is a normal (not exceptional) outcome handled by the
    /// profile synthesizer.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(f32, &str)> {
        let mut scored: Vec<(f32, &str)> = self
            .entries
            .iter()
            .map(|e| (l2_distance(query, &e.vector), e.text.as_str()))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// Persist the index to `path` (the vector store) and `meta_path(path)`
    /// (the ordered window-text sidecar). Uses `bincode` for both, matching
    /// the teacher's index persistence.
    pub fn save(&self, path: &Path) -> Result<()> {
        let vector_store = VectorStore {
            version: self.version,
            model_identity: self.model_identity.clone(),
            vectors: self.entries.iter().map(|e| e.vector.clone()).collect(),
        };
        let vector_file = File::create(path).map_err(StoryMindError::from)?;
        bincode::serialize_into(BufWriter::new(vector_file), &vector_store)
            .map_err(|e| StoryMindError::IndexCorrupt(format!("failed to serialize index vectors: {e}")))?;

        let sidecar = TextSidecar {
            texts: self.entries.iter().map(|e| e.text.clone()).collect(),
        };
        let meta_file = File::create(meta_path(path)).map_err(StoryMindError::from)?;
        bincode::serialize_into(BufWriter::new(meta_file), &sidecar)
            .map_err(|e| StoryMindError::IndexCorrupt(format!("failed to serialize index text sidecar: {e}")))?;

        tracing::info!("saved embedding index to {:?} ({} entries)", path, self.entries.len());
        Ok(())
    }

    /// Load an index from `path` and its `.meta` sidecar, verifying it was
    /// built with `expected_model_identity`. Missing either artifact, or a
    /// model-identity mismatch, is `IndexCorrupt` rather than a silent
    /// scoring pass against incompatible or absent vectors.
    pub fn load(path: &Path, expected_model_identity: &str) -> Result<Self> {
        let meta = meta_path(path);
        if !path.exists() || !meta.exists() {
            return Err(StoryMindError::IndexCorrupt(format!(
                "missing index sidecar artifact: expected both {path:?} and {meta:?} to exist"
            )));
        }

        let vector_file = File::open(path).map_err(StoryMindError::from)?;
        let vector_store: VectorStore = bincode::deserialize_from(BufReader::new(vector_file))
            .map_err(|e| StoryMindError::IndexCorrupt(format!("failed to deserialize index vectors: {e}")))?;

        let meta_file = File::open(&meta).map_err(StoryMindError::from)?;
        let sidecar: TextSidecar = bincode::deserialize_from(BufReader::new(meta_file))
            .map_err(|e| StoryMindError::IndexCorrupt(format!("failed to deserialize index text sidecar: {e}")))?;

        if vector_store.version != INDEX_STATE_VERSION {
            return Err(StoryMindError::IndexCorrupt(format!(
                "index version mismatch: expected {}, got {}",
                INDEX_STATE_VERSION, vector_store.version
            )));
        }
        if vector_store.model_identity != expected_model_identity {
            return Err(StoryMindError::IndexCorrupt(format!(
                "index was built with model '{}', but current model is '{}'",
                vector_store.model_identity, expected_model_identity
            )));
        }
        if vector_store.vectors.len() != sidecar.texts.len() {
            return Err(StoryMindError::IndexCorrupt(format!(
                "index vector count ({}) does not match text sidecar count ({})",
                vector_store.vectors.len(),
                sidecar.texts.len()
            )));
        }

        let entries = vector_store
            .vectors
            .into_iter()
            .zip(sidecar.texts)
            .map(|(vector, text)| IndexEntry { vector, text })
            .collect();

        Ok(Self {
            version: vector_store.version,
            model_identity: vector_store.model_identity,
            entries,
        })
    }

    /// Remove both sidecar artifacts for `path`, best-effort.
    pub fn remove_sidecars(path: &Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(meta_path(path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> EmbeddingIndex {
        EmbeddingIndex::build(
            "test-model",
            vec![
                vec![0.0, 0.0],
                vec![1.0, 0.0],
                vec![10.0, 10.0],
            ],
            vec!["near origin".into(), "also near".into(), "far away".into()],
        )
        .unwrap()
    }

    #[test]
    fn search_returns_closest_first() {
        let index = sample_index();
        let results = index.search(&[0.1, 0.1], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1, "near origin");
        assert_eq!(results[1].1, "also near");
    }

    #[test]
    fn search_k_larger_than_size_returns_all() {
        let index = sample_index();
        let results = index.search(&[0.0, 0.0], 100);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn search_on_empty_index_returns_empty() {
        let index = EmbeddingIndex::new("test-model");
        assert!(index.search(&[0.0, 0.0], 5).is_empty());
    }

    #[test]
    fn build_rejects_mismatched_lengths() {
        let err = EmbeddingIndex::build(
            "test-model",
            vec![vec![0.0], vec![1.0]],
            vec!["only one".into()],
        )
        .unwrap_err();
        assert!(matches!(err, StoryMindError::IndexCorrupt(_)));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        let index = sample_index();
        index.save(&path).unwrap();

        let loaded = EmbeddingIndex::load(&path, "test-model").unwrap();
        assert_eq!(loaded.len(), 3);
    }

    #[test]
    fn load_rejects_model_identity_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        let index = sample_index();
        index.save(&path).unwrap();

        let err = EmbeddingIndex::load(&path, "different-model").unwrap_err();
        assert!(matches!(err, StoryMindError::IndexCorrupt(_)));
    }

    #[test]
    fn load_rejects_missing_meta_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        let index = sample_index();
        index.save(&path).unwrap();

        std::fs::remove_file(meta_path(&path)).unwrap();

        let err = EmbeddingIndex::load(&path, "test-model").unwrap_err();
        assert!(matches!(err, StoryMindError::IndexCorrupt(_)));
    }

    #[test]
    fn load_rejects_missing_vector_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        let index = sample_index();
        index.save(&path).unwrap();

        std::fs::remove_file(&path).unwrap();

        let err = EmbeddingIndex::load(&path, "test-model").unwrap_err();
        assert!(matches!(err, StoryMindError::IndexCorrupt(_)));
    }
}
