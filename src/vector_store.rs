//! Flat in-memory vector index with on-disk persistence.
//!
//! A [`VectorStoreManager`] holds at most one index. Retrievers handed out by
//! the store share that index through an `Arc<RwLock<_>>`, so chunks appended
//! with [`VectorStoreManager::add`] are visible to them immediately, while
//! `create`/`load` swap in a fresh index and leave old retrievers untouched.
//!
//! On disk an index named `doc_index` is three files in the persist directory:
//!
//! - `doc_index.vectors`: little-endian `f32` rows, one per chunk;
//! - `doc_index.chunks.jsonl`: one [`DocumentChunk`] per line, same order;
//! - `doc_index.manifest.json`: an [`IndexManifest`], written last.

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{info, warn};

use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::{RagError, Result};
use crate::loader::DocumentChunk;
use crate::manifest::{checksum, IndexManifest};

/// Candidates considered by maximal-marginal-relevance search.
pub const DEFAULT_MMR_FETCH_K: usize = 20;
/// Relevance/diversity balance for maximal-marginal-relevance search.
pub const DEFAULT_MMR_LAMBDA: f32 = 0.5;
/// Number of chunks a retriever returns unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 4;

/// Exhaustive cosine-similarity index.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    model_id: String,
    dimensions: usize,
    chunks: Vec<DocumentChunk>,
    vectors: Vec<Vec<f32>>,
}

/// Shared handle to the current index.
pub type IndexHandle = Arc<RwLock<FlatIndex>>;

impl FlatIndex {
    fn new(model_id: &str, dimensions: usize) -> Self {
        Self {
            model_id: model_id.to_string(),
            dimensions,
            chunks: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// True when no chunks are indexed.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Indexed chunks in insertion order.
    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    fn push(&mut self, chunks: &[DocumentChunk], vectors: Vec<Vec<f32>>) -> Result<()> {
        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(RagError::Embedding(format!(
                "embedder returned a {}-dimensional vector, index expects {}",
                bad.len(),
                self.dimensions
            )));
        }
        self.chunks.extend_from_slice(chunks);
        self.vectors.extend(vectors);
        Ok(())
    }

    /// Every chunk index ordered by descending similarity; ties keep insertion order.
    fn ranked(&self, query: &[f32]) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, vector)| (idx, cosine_similarity(query, vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored
    }

    fn top_k(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut ranked = self.ranked(query);
        ranked.truncate(k);
        ranked
    }

    fn mmr(&self, query: &[f32], k: usize, fetch_k: usize, lambda: f32) -> Vec<(usize, f32)> {
        let mut candidates = self.top_k(query, fetch_k.max(k));
        let mut selected: Vec<(usize, f32)> = Vec::with_capacity(k);
        while selected.len() < k && !candidates.is_empty() {
            let mut best_pos = 0;
            let mut best_score = f32::NEG_INFINITY;
            for (pos, (idx, relevance)) in candidates.iter().enumerate() {
                let redundancy = selected
                    .iter()
                    .map(|(chosen, _)| cosine_similarity(&self.vectors[*idx], &self.vectors[*chosen]))
                    .fold(f32::NEG_INFINITY, f32::max);
                let redundancy = if selected.is_empty() { 0.0 } else { redundancy };
                let score = lambda * relevance - (1.0 - lambda) * redundancy;
                if score > best_score {
                    best_score = score;
                    best_pos = pos;
                }
            }
            selected.push(candidates.remove(best_pos));
        }
        selected
    }

    fn materialize(&self, hits: Vec<(usize, f32)>) -> Vec<(DocumentChunk, f32)> {
        hits.into_iter()
            .map(|(idx, score)| (self.chunks[idx].clone(), score))
            .collect()
    }
}

/// How a [`Retriever`] picks chunks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SearchType {
    /// Top-k by cosine similarity.
    #[default]
    Similarity,
    /// Maximal marginal relevance over the `fetch_k` most similar chunks.
    Mmr {
        /// Candidate pool size.
        fetch_k: usize,
        /// 1.0 is pure relevance, 0.0 is pure diversity.
        lambda: f32,
    },
    /// Top-k restricted to chunks scoring at least `threshold`.
    SimilarityScoreThreshold {
        /// Minimum cosine similarity.
        threshold: f32,
    },
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Similarity => write!(f, "similarity"),
            Self::Mmr { .. } => write!(f, "mmr"),
            Self::SimilarityScoreThreshold { .. } => write!(f, "similarity_score_threshold"),
        }
    }
}

/// Anything that can turn a question into relevant chunks.
pub trait Retrieve: Send + Sync {
    /// Returns chunks relevant to `query`, best first.
    fn retrieve(&self, query: &str) -> Result<Vec<DocumentChunk>>;
}

/// Query object bound to one index and one embedder.
#[derive(Clone)]
pub struct Retriever {
    index: IndexHandle,
    embedder: Arc<dyn Embedder>,
    search: SearchType,
    k: usize,
}

impl Retriever {
    /// Configured search strategy.
    pub fn search_type(&self) -> SearchType {
        self.search
    }

    /// Maximum chunks returned per query.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Like [`Retrieve::retrieve`] but keeps similarity scores.
    pub fn retrieve_with_scores(&self, query: &str) -> Result<Vec<(DocumentChunk, f32)>> {
        let query_vector = self.embedder.embed_query(query)?;
        let index = read_index(&self.index);
        let hits = match self.search {
            SearchType::Similarity => index.top_k(&query_vector, self.k),
            SearchType::Mmr { fetch_k, lambda } => {
                index.mmr(&query_vector, self.k, fetch_k, lambda)
            }
            SearchType::SimilarityScoreThreshold { threshold } => index
                .top_k(&query_vector, self.k)
                .into_iter()
                .filter(|(_, score)| *score >= threshold)
                .collect(),
        };
        Ok(index.materialize(hits))
    }
}

impl Retrieve for Retriever {
    fn retrieve(&self, query: &str) -> Result<Vec<DocumentChunk>> {
        Ok(self
            .retrieve_with_scores(query)?
            .into_iter()
            .map(|(chunk, _)| chunk)
            .collect())
    }
}

impl fmt::Debug for Retriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retriever")
            .field("model", &self.embedder.model_id())
            .field("search", &self.search)
            .field("k", &self.k)
            .finish()
    }
}

/// Owns the current index, its embedder and the persist directory.
pub struct VectorStoreManager {
    embedder: Arc<dyn Embedder>,
    persist_dir: PathBuf,
    index: Option<IndexHandle>,
}

impl VectorStoreManager {
    /// Builds an empty store that persists under `persist_dir`.
    pub fn new(embedder: Arc<dyn Embedder>, persist_dir: impl Into<PathBuf>) -> Self {
        Self {
            embedder,
            persist_dir: persist_dir.into(),
            index: None,
        }
    }

    /// Directory holding persisted indexes.
    pub fn persist_dir(&self) -> &Path {
        &self.persist_dir
    }

    /// Embedder paired with this store.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// True when an index is held in memory.
    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Chunk count of the held index, zero without one.
    pub fn len(&self) -> usize {
        self.index
            .as_ref()
            .map(|index| read_index(index).len())
            .unwrap_or(0)
    }

    /// True when no chunks are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embeds `chunks` into a brand-new index that replaces any held one.
    pub fn create(&mut self, chunks: &[DocumentChunk]) -> Result<IndexHandle> {
        if chunks.is_empty() {
            return Err(RagError::InvalidInput(
                "cannot create an index from zero chunks".to_string(),
            ));
        }
        let vectors = self.embed_chunks(chunks)?;
        let mut index = FlatIndex::new(self.embedder.model_id(), self.embedder.dimensions());
        index.push(chunks, vectors)?;
        info!(chunks = index.len(), model = %index.model_id, "created vector index");
        let handle = Arc::new(RwLock::new(index));
        self.index = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Appends `chunks` to the held index, creating one when absent.
    pub fn add(&mut self, chunks: &[DocumentChunk]) -> Result<()> {
        if chunks.is_empty() {
            warn!("no chunks to add; index left unchanged");
            return Ok(());
        }
        let Some(handle) = self.index.clone() else {
            self.create(chunks)?;
            return Ok(());
        };
        let vectors = self.embed_chunks(chunks)?;
        let mut index = write_index(&handle);
        index.push(chunks, vectors)?;
        info!(added = chunks.len(), total = index.len(), "extended vector index");
        Ok(())
    }

    /// Persists the held index as `name`; a no-op without one.
    pub fn save(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let Some(handle) = &self.index else {
            warn!(name, "no vector index to save");
            return Ok(());
        };
        let index = read_index(handle);
        fs::create_dir_all(&self.persist_dir)?;

        let vectors_file = IndexManifest::vectors_file_name(name);
        let chunks_file = IndexManifest::chunks_file_name(name);

        let mut raw = Vec::with_capacity(index.len() * index.dimensions * 4);
        for vector in &index.vectors {
            for value in vector {
                raw.extend_from_slice(&value.to_le_bytes());
            }
        }
        fs::write(self.persist_dir.join(&vectors_file), &raw)?;

        let mut writer = BufWriter::new(fs::File::create(self.persist_dir.join(&chunks_file))?);
        for chunk in &index.chunks {
            serde_json::to_writer(&mut writer, chunk)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        let manifest = IndexManifest {
            name: name.to_string(),
            embedding_model: index.model_id.clone(),
            dimensions: index.dimensions,
            chunk_count: index.len(),
            vectors_file,
            chunks_file,
            vectors_checksum: checksum(&raw),
            saved_at: Utc::now(),
        };
        manifest.write_atomic(&IndexManifest::path_for(&self.persist_dir, name))?;
        info!(name, chunks = manifest.chunk_count, dir = %self.persist_dir.display(), "saved vector index");
        Ok(())
    }

    /// True when a manifest for `name` exists on disk.
    pub fn persisted_exists(&self, name: &str) -> bool {
        IndexManifest::path_for(&self.persist_dir, name).is_file()
    }

    /// Loads the persisted index `name`, replacing the held one.
    ///
    /// Returns `Ok(None)` when no manifest exists.
    pub fn load(&mut self, name: &str) -> Result<Option<IndexHandle>> {
        validate_name(name)?;
        let manifest_path = IndexManifest::path_for(&self.persist_dir, name);
        let Some(manifest) = IndexManifest::read(&manifest_path)? else {
            return Ok(None);
        };
        if manifest.embedding_model != self.embedder.model_id() {
            return Err(RagError::persistence(
                &manifest_path,
                format!(
                    "index was built with embedder {} but {} is configured",
                    manifest.embedding_model,
                    self.embedder.model_id()
                ),
            ));
        }
        if manifest.dimensions != self.embedder.dimensions() {
            return Err(RagError::persistence(
                &manifest_path,
                format!(
                    "index has {} dimensions but the embedder produces {}",
                    manifest.dimensions,
                    self.embedder.dimensions()
                ),
            ));
        }

        let vectors = self.read_vectors(&manifest)?;
        let chunks = self.read_chunks(&manifest)?;
        let mut index = FlatIndex::new(&manifest.embedding_model, manifest.dimensions);
        index.chunks = chunks;
        index.vectors = vectors;
        info!(name, chunks = index.len(), "loaded vector index");
        let handle = Arc::new(RwLock::new(index));
        self.index = Some(Arc::clone(&handle));
        Ok(Some(handle))
    }

    /// Builds a retriever over the held index.
    pub fn retriever(&self, search: SearchType, k: usize) -> Result<Retriever> {
        let handle = self.index.as_ref().ok_or(RagError::NotReady)?;
        if k == 0 {
            return Err(RagError::InvalidInput(
                "retriever must return at least one chunk".to_string(),
            ));
        }
        Ok(Retriever {
            index: Arc::clone(handle),
            embedder: Arc::clone(&self.embedder),
            search,
            k,
        })
    }

    /// Top-k chunks by cosine similarity.
    pub fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<DocumentChunk>> {
        Ok(self
            .similarity_search_with_scores(query, k)?
            .into_iter()
            .map(|(chunk, _)| chunk)
            .collect())
    }

    /// Top-k chunks with their cosine similarity.
    pub fn similarity_search_with_scores(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<(DocumentChunk, f32)>> {
        let handle = self.index.as_ref().ok_or(RagError::NotReady)?;
        let query_vector = self.embedder.embed_query(query)?;
        let index = read_index(handle);
        let hits = index.top_k(&query_vector, k);
        Ok(index.materialize(hits))
    }

    /// Drops the in-memory index; persisted files stay.
    pub fn reset(&mut self) {
        if self.index.take().is_some() {
            info!("dropped in-memory vector index");
        }
    }

    fn embed_chunks(&self, chunks: &[DocumentChunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        self.embedder.embed(&texts)
    }

    fn read_vectors(&self, manifest: &IndexManifest) -> Result<Vec<Vec<f32>>> {
        let path = self.persist_dir.join(&manifest.vectors_file);
        let raw = fs::read(&path)
            .map_err(|err| RagError::persistence(&path, format!("cannot read vectors: {err}")))?;
        let row_bytes = manifest
            .dimensions
            .checked_mul(4)
            .ok_or_else(|| RagError::persistence(&path, "dimensions overflow"))?;
        let expected = manifest
            .chunk_count
            .checked_mul(row_bytes)
            .ok_or_else(|| RagError::persistence(&path, "chunk_count/dimensions overflow"))?;
        if raw.len() != expected {
            return Err(RagError::persistence(
                &path,
                format!(
                    "expected {} bytes for {} vectors, found {}",
                    expected,
                    manifest.chunk_count,
                    raw.len()
                ),
            ));
        }
        if checksum(&raw) != manifest.vectors_checksum {
            return Err(RagError::persistence(&path, "vectors checksum mismatch"));
        }
        if row_bytes == 0 {
            return Ok(Vec::new());
        }
        Ok(raw
            .chunks_exact(row_bytes)
            .map(|row| {
                row.chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect()
            })
            .collect())
    }

    fn read_chunks(&self, manifest: &IndexManifest) -> Result<Vec<DocumentChunk>> {
        let path = self.persist_dir.join(&manifest.chunks_file);
        let file = fs::File::open(&path)
            .map_err(|err| RagError::persistence(&path, format!("cannot read chunks: {err}")))?;
        let mut chunks = Vec::with_capacity(manifest.chunk_count);
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let chunk: DocumentChunk = serde_json::from_str(&line).map_err(|err| {
                RagError::persistence(&path, format!("line {}: {err}", line_no + 1))
            })?;
            chunks.push(chunk);
        }
        if chunks.len() != manifest.chunk_count {
            return Err(RagError::persistence(
                &path,
                format!(
                    "manifest lists {} chunks but the file has {}",
                    manifest.chunk_count,
                    chunks.len()
                ),
            ));
        }
        Ok(chunks)
    }
}

impl fmt::Debug for VectorStoreManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorStoreManager")
            .field("model", &self.embedder.model_id())
            .field("persist_dir", &self.persist_dir)
            .field("chunks", &self.len())
            .finish()
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.trim().is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(RagError::InvalidInput(format!("invalid index name {name:?}")))
    }
}

fn read_index(handle: &IndexHandle) -> RwLockReadGuard<'_, FlatIndex> {
    handle.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_index(handle: &IndexHandle) -> RwLockWriteGuard<'_, FlatIndex> {
    handle.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;
    use crate::loader::ChunkMetadata;
    use pretty_assertions::assert_eq;

    fn chunk(text: &str, page: usize) -> DocumentChunk {
        DocumentChunk {
            text: text.to_string(),
            metadata: ChunkMetadata {
                source: "notes.pdf".to_string(),
                file_type: "pdf".to_string(),
                page,
            },
        }
    }

    fn store(dir: &Path) -> VectorStoreManager {
        let embedder = HashingEmbedder::new(128).expect("embedder");
        VectorStoreManager::new(Arc::new(embedder), dir)
    }

    #[test]
    fn search_without_index_is_not_ready() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        assert!(matches!(
            store.similarity_search("anything", 4),
            Err(RagError::NotReady)
        ));
        assert!(matches!(
            store.retriever(SearchType::Similarity, 4),
            Err(RagError::NotReady)
        ));
    }

    #[test]
    fn ties_keep_insertion_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = store(dir.path());
        store
            .create(&[chunk("same words", 0), chunk("same words", 1), chunk("same words", 2)])
            .expect("create");
        let pages: Vec<usize> = store
            .similarity_search("same words", 3)
            .expect("search")
            .into_iter()
            .map(|c| c.metadata.page)
            .collect();
        assert_eq!(pages, vec![0, 1, 2]);
    }

    #[test]
    fn add_extends_index_seen_by_existing_retriever() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = store(dir.path());
        store.create(&[chunk("apples and pears", 0)]).expect("create");
        let retriever = store.retriever(SearchType::Similarity, 4).expect("retriever");
        store.add(&[chunk("warehouse in Leeds", 1)]).expect("add");
        assert_eq!(store.len(), 2);
        let hits = retriever.retrieve("Leeds warehouse").expect("retrieve");
        assert_eq!(hits[0].metadata.page, 1);
    }

    #[test]
    fn score_threshold_filters_weak_matches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = store(dir.path());
        store
            .create(&[chunk("quarterly revenue grew", 0), chunk("zebra migration", 1)])
            .expect("create");
        let retriever = store
            .retriever(SearchType::SimilarityScoreThreshold { threshold: 0.3 }, 4)
            .expect("retriever");
        let hits = retriever.retrieve("quarterly revenue").expect("retrieve");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.page, 0);
    }

    #[test]
    fn mmr_prefers_diverse_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = store(dir.path());
        store
            .create(&[
                chunk("solar panel output", 0),
                chunk("solar panel output", 1),
                chunk("solar farm permits", 2),
            ])
            .expect("create");
        let retriever = store
            .retriever(
                SearchType::Mmr {
                    fetch_k: DEFAULT_MMR_FETCH_K,
                    lambda: DEFAULT_MMR_LAMBDA,
                },
                2,
            )
            .expect("retriever");
        let pages: Vec<usize> = retriever
            .retrieve("solar output")
            .expect("retrieve")
            .into_iter()
            .map(|c| c.metadata.page)
            .collect();
        assert_eq!(pages, vec![0, 2]);
    }

    #[test]
    fn reset_keeps_persisted_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = store(dir.path());
        store.create(&[chunk("kept on disk", 0)]).expect("create");
        store.save("doc_index").expect("save");
        store.reset();
        assert!(!store.has_index());
        assert!(store.persisted_exists("doc_index"));
        assert!(store.load("doc_index").expect("load").is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn rejects_path_like_index_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        assert!(matches!(
            store.save("../escape"),
            Err(RagError::InvalidInput(_))
        ));
    }
}
