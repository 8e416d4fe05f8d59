use anyhow::Result;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use tokio::sync::RwLock;

use crate::config::Config;

/// Hard ceiling for one batch embedding request.
const BATCH_TIMEOUT_SECS: u64 = 1200;

#[derive(Serialize)]
#[serde(untagged)]
enum OllamaEmbeddingRequest<'a> {
    Single { model: &'a str, input: &'a str },
    Batch { model: &'a str, input: &'a [String] },
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    embeddings: Option<Vec<Vec<f32>>>,
}

/// Embedding service backed by the Ollama API, with LRU query caching.
/// Supports both single and batch embedding operations.
pub struct EmbeddingService {
    client: reqwest::Client,
    ollama_url: String,
    model: String,
    query_cache: RwLock<LruCache<String, Vec<f32>>>,
}

impl EmbeddingService {
    /// Builds the service and verifies that Ollama is reachable and the
    /// configured embedding model is pulled. Either failure is fatal for
    /// the calling command.
    pub async fn new(config: &Config) -> Result<Self> {
        let service = Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(BATCH_TIMEOUT_SECS))
                .build()?,
            ollama_url: config.ollama_url.clone(),
            model: config.embedding_model.clone(),
            query_cache: RwLock::new(LruCache::new(NonZeroUsize::new(1000).unwrap())),
        };

        service.test_connection().await?;
        service.verify_model().await?;

        Ok(service)
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = OllamaEmbeddingRequest::Single {
            model: &self.model,
            input: text,
        };
        let response = self
            .client
            .post(format!("{}/api/embed", self.ollama_url))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Ollama API error: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }
        let embedding_response: OllamaEmbeddingResponse = response.json().await?;
        if let Some(embedding) = embedding_response.embedding {
            Ok(embedding)
        } else if let Some(embeddings) = embedding_response.embeddings {
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("Empty embeddings array from Ollama"))
        } else {
            Err(anyhow::anyhow!("No embedding returned from Ollama"))
        }
    }

    /// Embeds a retrieval query, serving repeats from the LRU cache.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.query_cache.write().await.get(text) {
            return Ok(cached.clone());
        }

        let embedding = self.embed(text).await?;
        self.query_cache
            .write()
            .await
            .put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    /// Embeds a batch of texts in one request where the model supports it,
    /// falling back to sequential single-text requests otherwise.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        if texts.len() > 1 {
            let request = OllamaEmbeddingRequest::Batch {
                model: &self.model,
                input: texts,
            };

            let request_future = self
                .client
                .post(format!("{}/api/embed", self.ollama_url))
                .json(&request)
                .send();

            let response = match tokio::time::timeout(
                tokio::time::Duration::from_secs(BATCH_TIMEOUT_SECS),
                request_future,
            )
            .await
            {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(anyhow::anyhow!(
                        "Batch embedding request timed out after {} seconds for {} texts. \
                         The Ollama server may be overloaded.",
                        BATCH_TIMEOUT_SECS,
                        texts.len()
                    ))
                }
            };

            if !response.status().is_success() {
                return Err(anyhow::anyhow!(
                    "Ollama API error: {} - {}",
                    response.status(),
                    response.text().await.unwrap_or_default()
                ));
            }

            let embedding_response: OllamaEmbeddingResponse = response.json().await?;

            if let Some(embeddings) = embedding_response.embeddings {
                if embeddings.len() == texts.len() {
                    return Ok(embeddings);
                }
                tracing::warn!(
                    "Batch embedding returned {} embeddings for {} texts, falling back to sequential",
                    embeddings.len(),
                    texts.len()
                );
            } else if embedding_response.embedding.is_some() {
                tracing::warn!(
                    "Model '{}' doesn't support batch embeddings, falling back to sequential",
                    self.model
                );
            }

            tracing::info!("Processing {} embeddings sequentially", texts.len());
            let mut result = Vec::with_capacity(texts.len());
            for text in texts {
                let embedding = self.embed(text).await?;
                result.push(embedding);
            }
            return Ok(result);
        }

        let embedding = self.embed(&texts[0]).await?;
        Ok(vec![embedding])
    }

    async fn test_connection(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.ollama_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Cannot connect to Ollama at {}. Make sure Ollama is running.",
                self.ollama_url
            ));
        }

        tracing::info!("Successfully connected to Ollama at {}", self.ollama_url);
        Ok(())
    }

    async fn verify_model(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.ollama_url))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Failed to list models from Ollama: {} - {}",
                status,
                body
            ));
        }

        let tags: serde_json::Value = response.json().await?;
        let models = tags["models"]
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Cannot list models"))?;

        let exists = models
            .iter()
            .any(|m| m["name"].as_str().unwrap_or("").starts_with(&self.model));

        if !exists {
            let available: Vec<_> = models.iter().filter_map(|m| m["name"].as_str()).collect();
            return Err(anyhow::anyhow!(
                "Model '{}' not found. Available: {:?}. Run: ollama pull {}",
                self.model,
                available,
                self.model
            ));
        }

        tracing::info!("Model '{}' verified", self.model);
        Ok(())
    }
}
