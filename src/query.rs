use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;

use crate::config::Config;
use crate::embeddings::EmbeddingService;
use crate::llm::ChatService;
use crate::store::{ScoredChunk, VectorIndex};
use crate::text::normalize;

/// Upper bound on alternative phrasings requested from the model.
const MAX_EXPANSIONS: usize = 5;

const ANSWER_TEMPLATE: &str = "\
You are an assistant specialized in law and legislative proposals. Answer \
questions about statutes and legal articles using only the information in \
the provided context. Respond in formal legal register, state clearly when \
the context is insufficient to answer with certainty, and structure the \
answer for readability.

Context:
{context}

---

Question: {question}

Answer:";

const QUERY_EXPANSION_TEMPLATE: &str = "\
Generate five alternative versions of the user's question to improve \
document retrieval from a vector database. The questions concern legal \
documents, so keep them focused on that domain. Return only the five \
questions, one per line, with no additional text.
Original question: {question}";

/// Answers a question end-to-end: expand → retrieve → merge → synthesize.
pub async fn run(config: &Config, question: &str, top_k: usize) -> Result<()> {
    let embeddings = EmbeddingService::new(config).await?;
    let index = VectorIndex::open(config).await?;

    if index.is_empty() {
        println!("The index is empty. Run `legis-rag ingest` first.");
        return Ok(());
    }

    let chat = ChatService::new(config)?;
    tracing::debug!("Chat model: {}", chat.model_name());

    let results = retrieve(&index, &embeddings, &chat, question, top_k).await?;
    if results.is_empty() {
        println!("No relevant chunks found for this question.");
        return Ok(());
    }

    let context_text: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
    let prompt = ANSWER_TEMPLATE
        .replace("{context}", &context_text.join("\n\n---\n\n"))
        .replace("{question}", question);

    // Synthesis failure is fatal, unlike expansion
    let answer = chat.generate(&prompt).await?;

    let sources: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    println!("{}", answer.trim());
    println!();
    println!("Sources: {sources:?}");
    for result in &results {
        println!(
            "  {} (source: {}, page: {}, score: {:.4})",
            result.id, result.source, result.page, result.score
        );
    }

    Ok(())
}

/// Multi-query retrieval: expands the question, searches once per distinct
/// normalized query, and merges the result sets.
async fn retrieve(
    index: &VectorIndex,
    embeddings: &EmbeddingService,
    chat: &ChatService,
    question: &str,
    top_k: usize,
) -> Result<Vec<ScoredChunk>> {
    let expansions = expand_queries(chat, question).await;
    if expansions.is_empty() {
        tracing::info!("Retrieving with the original query only");
    } else {
        tracing::info!("Generated {} alternative queries", expansions.len());
        for (i, q) in expansions.iter().enumerate() {
            tracing::debug!("Alternative {}: {}", i + 1, q);
        }
    }

    // Original query first, then the alternatives, all normalized and deduplicated
    let mut seen = HashSet::new();
    let queries: Vec<String> = std::iter::once(question.to_string())
        .chain(expansions)
        .map(|q| normalize(&q))
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.clone()))
        .collect();

    let mut batches = Vec::with_capacity(queries.len());
    for query in &queries {
        let query_embedding = embeddings.embed_query(query).await?;
        batches.push(index.similarity_search(&query_embedding, top_k));
    }

    Ok(merge_results(batches, top_k))
}

/// Asks the chat model for alternative phrasings.
///
/// Any failure here (unreachable model, timeout, unusable output) degrades
/// to an empty list so retrieval can proceed with the original query.
async fn expand_queries(chat: &ChatService, question: &str) -> Vec<String> {
    let prompt = QUERY_EXPANSION_TEMPLATE.replace("{question}", question);

    match chat.generate(&prompt).await {
        Ok(response) => parse_expansions(&response, MAX_EXPANSIONS),
        Err(e) => {
            tracing::warn!("Query expansion failed, using original query only: {}", e);
            Vec::new()
        }
    }
}

/// Extracts up to `max` non-empty lines from the model's response,
/// stripping list numbering and bullet markers.
fn parse_expansions(response: &str, max: usize) -> Vec<String> {
    response
        .lines()
        .map(|line| list_marker_regex().replace(line.trim(), "").to_string())
        .filter(|line| !line.is_empty())
        .take(max)
        .collect()
}

/// Cached regex for leading list markers ("1.", "2)", "-", "*")
fn list_marker_regex() -> &'static Regex {
    static LIST_MARKER: OnceLock<Regex> = OnceLock::new();
    LIST_MARKER
        .get_or_init(|| Regex::new(r"^(?:\d+[.)]\s*|[-*]\s+)").expect("valid list marker pattern"))
}

/// Merges per-query result batches into one ranked list.
///
/// Results with identical content are collapsed to the single best-scoring
/// occurrence (ties broken by smaller ID, so merge order never matters).
/// The merged list is sorted by descending score and truncated to `top_k`.
fn merge_results(batches: Vec<Vec<ScoredChunk>>, top_k: usize) -> Vec<ScoredChunk> {
    let mut best_by_content: HashMap<String, ScoredChunk> = HashMap::new();

    for result in batches.into_iter().flatten() {
        match best_by_content.get(&result.content) {
            Some(kept)
                if kept.score > result.score
                    || (kept.score == result.score && kept.id <= result.id) => {}
            _ => {
                best_by_content.insert(result.content.clone(), result);
            }
        }
    }

    let mut merged: Vec<ScoredChunk> = best_by_content.into_values().collect();
    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    merged.truncate(top_k);
    merged
}

/// Dumps the persisted index, or runs a raw similarity query against it
/// without any LLM involvement.
pub async fn inspect(config: &Config, raw_query: Option<&str>, limit: usize) -> Result<()> {
    let index = VectorIndex::open(config).await?;
    println!("Chunks in index: {}", index.len());

    match raw_query {
        Some(query) => {
            let embeddings = EmbeddingService::new(config).await?;
            let query_embedding = embeddings.embed_query(&normalize(query)).await?;
            for result in index.similarity_search(&query_embedding, limit) {
                println!();
                println!(
                    "{} (source: {}, page: {}, score: {:.4})",
                    result.id, result.source, result.page, result.score
                );
                println!("{}", result.content);
            }
        }
        None => {
            for chunk in index.chunks_sorted_by_id().into_iter().take(limit) {
                println!();
                println!("{} (source: {}, page: {})", chunk.id, chunk.source, chunk.page);
                println!("{}", chunk.content);
            }
        }
    }

    Ok(())
}
