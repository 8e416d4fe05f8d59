use std::path::PathBuf;

/// Runtime configuration assembled from environment variables.
///
/// Every component receives the values it needs explicitly at construction;
/// nothing reads paths or model names from globals after startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory scanned for PDF documents during ingestion.
    pub documents_dir: PathBuf,
    /// Directory holding the persisted vector index.
    pub data_dir: PathBuf,
    pub ollama_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap in characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Default number of results returned by retrieval.
    pub top_k: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            documents_dir: PathBuf::from(
                std::env::var("DOCUMENTS_DIR").unwrap_or_else(|_| "./documents".to_string()),
            ),
            data_dir: PathBuf::from(
                std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            ),
            ollama_url: std::env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            embedding_model: std::env::var("OLLAMA_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "nomic-embed-text".to_string()),
            chat_model: std::env::var("OLLAMA_CHAT_MODEL")
                .unwrap_or_else(|_| "llama3.2".to_string()),
            chunk_size: parse_env("CHUNK_SIZE", 1000),
            chunk_overlap: parse_env("CHUNK_OVERLAP", 250),
            top_k: parse_env("TOP_K", 5),
        }
    }
}

fn parse_env(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::from_env();
        assert!(config.chunk_overlap < config.chunk_size);
        assert!(config.top_k > 0);
    }
}
