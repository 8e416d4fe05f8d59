use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::splitter::Chunk;

const INDEX_FILE: &str = "index.json";
const INDEX_VERSION: u32 = 1;

/// A chunk as persisted in the index: content, provenance, and its
/// L2-normalized embedding. Never mutated in place; updates go through
/// delete-and-readd under the same ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: String,
    pub content: String,
    pub source: String,
    pub page: usize,
    pub embedding: Vec<f32>,
}

impl StoredChunk {
    pub fn new(chunk: Chunk, mut embedding: Vec<f32>) -> Self {
        normalize(&mut embedding);
        Self {
            id: chunk.id,
            content: chunk.content,
            source: chunk.source,
            page: chunk.page,
            embedding,
        }
    }
}

/// A retrieval result: chunk data plus its cosine-similarity score.
/// Higher scores are better; results are query-scoped and never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub id: String,
    pub content: String,
    pub source: String,
    pub page: usize,
    pub score: f32,
}

#[derive(Serialize)]
struct PersistedState<'a> {
    version: u32,
    model: &'a str,
    dimension: Option<usize>,
    updated_at: String,
    chunks: &'a HashMap<String, StoredChunk>,
}

#[derive(Deserialize)]
struct LoadedState {
    version: u32,
    model: String,
    dimension: Option<usize>,
    #[allow(dead_code)] // Round-tripped for inspection, not read back
    updated_at: String,
    chunks: HashMap<String, StoredChunk>,
}

/// On-disk vector index with an explicit open/save lifecycle.
///
/// One JSON file per index directory, keyed by chunk ID, written atomically
/// (temp file + rename). The embedding model name and dimensionality are
/// recorded so a model swap cannot silently mix incompatible vectors.
#[derive(Debug)]
pub struct VectorIndex {
    chunks: HashMap<String, StoredChunk>,
    model: String,
    dimension: Option<usize>,
    path: PathBuf,
}

impl VectorIndex {
    /// Opens the index under `config.data_dir`, creating the directory and
    /// starting empty when no index file exists yet.
    ///
    /// Fails when the directory cannot be created, the file cannot be
    /// parsed, or the persisted embedding model differs from the configured
    /// one (run `ingest --reset` to rebuild under a new model).
    pub async fn open(config: &Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .with_context(|| format!("Failed to create index directory {:?}", config.data_dir))?;

        let path = config.data_dir.join(INDEX_FILE);
        let mut index = Self {
            chunks: HashMap::new(),
            model: config.embedding_model.clone(),
            dimension: None,
            path,
        };

        if tokio::fs::try_exists(&index.path).await? {
            let data = tokio::fs::read_to_string(&index.path)
                .await
                .with_context(|| format!("Failed to read index file {:?}", index.path))?;
            let state: LoadedState = serde_json::from_str(&data)
                .with_context(|| format!("Corrupt index file {:?}", index.path))?;

            if state.version != INDEX_VERSION {
                return Err(anyhow::anyhow!(
                    "Index file {:?} has version {} (expected {}). Run `ingest --reset` to rebuild.",
                    index.path,
                    state.version,
                    INDEX_VERSION
                ));
            }
            if state.model != index.model {
                return Err(anyhow::anyhow!(
                    "Index at {:?} was built with embedding model '{}' but '{}' is configured. \
                     Run `ingest --reset` to rebuild.",
                    index.path,
                    state.model,
                    index.model
                ));
            }

            index.chunks = state.chunks;
            index.dimension = state.dimension;
            // Normalize on load so legacy data can't break the dot-product fast path
            for chunk in index.chunks.values_mut() {
                normalize(&mut chunk.embedding);
            }
            tracing::info!("Loaded {} chunks from {:?}", index.chunks.len(), index.path);
        } else {
            tracing::info!("No existing index at {:?}, starting fresh", index.path);
        }

        Ok(index)
    }

    /// Wipes the index directory. Used by `ingest --reset`.
    pub fn reset(data_dir: &Path) -> Result<()> {
        if data_dir.exists() {
            std::fs::remove_dir_all(data_dir)
                .with_context(|| format!("Failed to clear index directory {data_dir:?}"))?;
        }
        Ok(())
    }

    pub fn existing_ids(&self) -> HashSet<String> {
        self.chunks.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Inserts or replaces chunks by ID. Every embedding must match the
    /// index dimensionality (fixed by the first chunk ever inserted).
    pub fn upsert(&mut self, chunks: Vec<StoredChunk>) -> Result<()> {
        for chunk in chunks {
            if chunk.embedding.is_empty() {
                return Err(anyhow::anyhow!("Chunk '{}' has an empty embedding", chunk.id));
            }
            match self.dimension {
                None => self.dimension = Some(chunk.embedding.len()),
                Some(dim) if dim != chunk.embedding.len() => {
                    return Err(anyhow::anyhow!(
                        "Chunk '{}' has embedding dimension {} but the index holds {}",
                        chunk.id,
                        chunk.embedding.len(),
                        dim
                    ));
                }
                Some(_) => {}
            }
            self.chunks.insert(chunk.id.clone(), chunk);
        }
        Ok(())
    }

    /// Persists the index atomically: write a temp file, then rename.
    pub async fn save(&self) -> Result<()> {
        let state = PersistedState {
            version: INDEX_VERSION,
            model: &self.model,
            dimension: self.dimension,
            updated_at: chrono::Utc::now().to_rfc3339(),
            chunks: &self.chunks,
        };
        let data = serde_json::to_string(&state)?;

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, data)
            .await
            .context("Failed to write index to temporary file")?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .context("Failed to commit index file (atomic rename)")?;

        tracing::debug!("Saved {} chunks to {:?}", self.chunks.len(), self.path);
        Ok(())
    }

    /// Nearest-neighbor search by cosine similarity.
    ///
    /// Embeddings are stored L2-normalized, so the dot product is the cosine
    /// similarity. Results are sorted descending (higher is better) and
    /// truncated to `k`.
    pub fn similarity_search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut query = query.to_vec();
        normalize(&mut query);

        let mut results: Vec<ScoredChunk> = self
            .chunks
            .values()
            .map(|chunk| ScoredChunk {
                id: chunk.id.clone(),
                content: chunk.content.clone(),
                source: chunk.source.clone(),
                page: chunk.page,
                score: dot_product(&query, &chunk.embedding),
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);
        results
    }

    /// All chunks ordered by ID, for inspection output.
    pub fn chunks_sorted_by_id(&self) -> Vec<&StoredChunk> {
        let mut chunks: Vec<&StoredChunk> = self.chunks.values().collect();
        chunks.sort_by(|a, b| a.id.cmp(&b.id));
        chunks
    }
}

/// Normalize a vector to unit length in-place.
/// Vectors with near-zero norm are left unchanged.
fn normalize(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq > 1e-20 {
        let norm = norm_sq.sqrt();
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product over the shorter of the two vectors. Equals cosine
/// similarity when both sides are normalized.
#[inline(always)]
fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
