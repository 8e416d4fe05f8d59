use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

use crate::config::Config;

/// Per-request ceiling for one generation call.
const GENERATE_TIMEOUT_SECS: u64 = 120;

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Chat-completion client backed by the Ollama generate API.
///
/// Used for query expansion and answer synthesis; callers decide whether a
/// failure is fatal or degradable.
pub struct ChatService {
    client: reqwest::Client,
    ollama_url: String,
    model: String,
}

impl ChatService {
    pub fn new(config: &Config) -> Result<Self> {
        // Pooled connections avoid a new handshake on every call
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(300)))
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .timeout(Duration::from_secs(GENERATE_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            ollama_url: config.ollama_url.clone(),
            model: config.chat_model.clone(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Sends one fully-rendered prompt and returns the model's text.
    /// Bounded by `GENERATE_TIMEOUT_SECS`; no retries.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let request = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: Some(OllamaOptions {
                temperature: Some(0.7),
            }),
        };

        let request_future = self
            .client
            .post(format!("{}/api/generate", self.ollama_url))
            .json(&request)
            .send();

        let response = match timeout(Duration::from_secs(GENERATE_TIMEOUT_SECS), request_future)
            .await
        {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(e).context("Ollama generate request failed"),
            Err(_) => {
                return Err(anyhow::anyhow!(
                    "Generation timed out after {} seconds (model '{}')",
                    GENERATE_TIMEOUT_SECS,
                    self.model
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

        let generate_response: OllamaGenerateResponse = response.json().await?;
        Ok(generate_response.response)
    }
}
