use std::collections::HashSet;

use anyhow::Result;

use crate::config::Config;
use crate::embeddings::EmbeddingService;
use crate::pdf;
use crate::splitter::{Chunk, TextSplitter};
use crate::store::{StoredChunk, VectorIndex};

/// Chunks per embedding request.
const EMBED_BATCH: usize = 32;

/// Assigns each chunk its deterministic ID: `"{source}:{page}:{index}"`.
///
/// `index` restarts at 0 whenever `source:page` differs from the previous
/// chunk and increments while it repeats. Single left-to-right pass; IDs are
/// stable across runs as long as the chunk sequence is unchanged.
pub fn assign_chunk_ids(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut last_page_id: Option<String> = None;
    let mut index = 0usize;

    for chunk in &mut chunks {
        let page_id = format!("{}:{}", chunk.source, chunk.page);
        if last_page_id.as_deref() == Some(page_id.as_str()) {
            index += 1;
        } else {
            index = 0;
        }
        chunk.id = format!("{page_id}:{index}");
        last_page_id = Some(page_id);
    }

    chunks
}

/// Returns the chunks whose ID is not already persisted, preserving order.
///
/// Duplicate IDs within the input indicate a chunk-generation bug; they are
/// logged and only the first occurrence is kept so the store never sees two
/// chunks under one ID.
pub fn select_new_chunks(chunks: Vec<Chunk>, existing_ids: &HashSet<String>) -> Vec<Chunk> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut new_chunks = Vec::new();

    for chunk in chunks {
        if !seen.insert(chunk.id.clone()) {
            tracing::warn!(
                "Duplicate chunk id '{}' produced during splitting; keeping first occurrence",
                chunk.id
            );
            continue;
        }
        if !existing_ids.contains(&chunk.id) {
            new_chunks.push(chunk);
        }
    }

    new_chunks
}

/// Runs a full ingestion pass: load → split → identify → dedup → embed → persist.
///
/// Idempotent over an unchanged corpus: every chunk ID already present is
/// skipped, so a second run adds nothing.
pub async fn run(config: &Config, reset: bool) -> Result<()> {
    if reset {
        tracing::info!("Clearing vector index at {:?}", config.data_dir);
        VectorIndex::reset(&config.data_dir)?;
    }

    let embeddings = EmbeddingService::new(config).await?;
    tracing::info!("Embedding model: {}", embeddings.model_name());

    let mut index = VectorIndex::open(config).await?;

    let pages = pdf::load_directory(&config.documents_dir).await?;
    if pages.is_empty() {
        tracing::warn!("Nothing to ingest");
        return Ok(());
    }

    let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap);
    let chunks = assign_chunk_ids(splitter.split_pages(&pages));
    tracing::info!("Split {} pages into {} chunks", pages.len(), chunks.len());

    let existing_ids = index.existing_ids();
    tracing::info!("Existing chunks in index: {}", existing_ids.len());

    let new_chunks = select_new_chunks(chunks, &existing_ids);
    if new_chunks.is_empty() {
        tracing::info!("No new chunks to add");
        return Ok(());
    }
    tracing::info!("Adding {} new chunks", new_chunks.len());

    let total_batches = new_chunks.len().div_ceil(EMBED_BATCH);
    for (batch_idx, batch) in new_chunks.chunks(EMBED_BATCH).enumerate() {
        tracing::debug!(
            "Batch {}/{}: embedding {} chunks",
            batch_idx + 1,
            total_batches,
            batch.len()
        );

        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let vectors = embeddings.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(anyhow::anyhow!(
                "Batch {}/{}: received {} embeddings for {} chunks",
                batch_idx + 1,
                total_batches,
                vectors.len(),
                batch.len()
            ));
        }

        let stored: Vec<StoredChunk> = batch
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, embedding)| StoredChunk::new(chunk, embedding))
            .collect();
        index.upsert(stored)?;
        index.save().await?;
    }

    tracing::info!(
        "Ingestion complete: {} chunks persisted ({} total in index)",
        new_chunks.len(),
        index.len()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, page: usize, content: &str) -> Chunk {
        Chunk {
            id: String::new(),
            content: content.to_string(),
            source: source.to_string(),
            page,
        }
    }

    #[test]
    fn ids_reset_per_page_and_increment_within() {
        let chunks = assign_chunk_ids(vec![
            chunk("law.pdf", 0, "a"),
            chunk("law.pdf", 0, "b"),
            chunk("law.pdf", 0, "c"),
            chunk("law.pdf", 1, "d"),
        ]);
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["law.pdf:0:0", "law.pdf:0:1", "law.pdf:0:2", "law.pdf:1:0"]
        );
    }

    #[test]
    fn ids_are_deterministic() {
        let input = vec![
            chunk("a.pdf", 0, "x"),
            chunk("a.pdf", 0, "y"),
            chunk("b.pdf", 3, "z"),
        ];
        let first = assign_chunk_ids(input.clone());
        let second = assign_chunk_ids(input);
        assert_eq!(first, second);
    }

    #[test]
    fn interleaved_pages_restart_the_counter() {
        // Reordering changes IDs: the counter tracks only the previous chunk
        let chunks = assign_chunk_ids(vec![
            chunk("a.pdf", 0, "x"),
            chunk("a.pdf", 1, "y"),
            chunk("a.pdf", 0, "z"),
        ]);
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a.pdf:0:0", "a.pdf:1:0", "a.pdf:0:0"]);
    }

    #[test]
    fn select_returns_everything_when_index_empty() {
        let chunks = assign_chunk_ids(vec![chunk("a.pdf", 0, "x"), chunk("a.pdf", 0, "y")]);
        let selected = select_new_chunks(chunks.clone(), &HashSet::new());
        assert_eq!(selected, chunks);
    }

    #[test]
    fn select_returns_nothing_when_all_ids_exist() {
        let chunks = assign_chunk_ids(vec![chunk("a.pdf", 0, "x"), chunk("a.pdf", 0, "y")]);
        let existing: HashSet<String> = chunks.iter().map(|c| c.id.clone()).collect();
        assert!(select_new_chunks(chunks, &existing).is_empty());
    }

    #[test]
    fn select_keeps_only_unseen_ids() {
        let chunks = assign_chunk_ids(vec![chunk("law.pdf", 0, "x"), chunk("law.pdf", 0, "y")]);
        let existing: HashSet<String> = ["law.pdf:0:0".to_string()].into_iter().collect();
        let selected = select_new_chunks(chunks, &existing);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "law.pdf:0:1");
    }

    #[test]
    fn duplicate_input_ids_keep_first_occurrence() {
        let mut a = chunk("a.pdf", 0, "first");
        a.id = "a.pdf:0:0".to_string();
        let mut b = chunk("a.pdf", 0, "second");
        b.id = "a.pdf:0:0".to_string();

        let selected = select_new_chunks(vec![a, b], &HashSet::new());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].content, "first");
    }

    #[test]
    fn reingestion_selects_nothing_the_second_time() {
        let raw = vec![
            chunk("law.pdf", 0, "articulo uno"),
            chunk("law.pdf", 0, "articulo dos"),
            chunk("law.pdf", 1, "articulo tres"),
        ];

        let first_run = select_new_chunks(assign_chunk_ids(raw.clone()), &HashSet::new());
        let persisted: HashSet<String> = first_run.iter().map(|c| c.id.clone()).collect();

        let second_run = select_new_chunks(assign_chunk_ids(raw), &persisted);
        assert!(second_run.is_empty());
    }
}
