//! Embedding generation behind a provider trait.
//!
//! The HTTP implementation talks to an OpenAI-compatible `/embeddings`
//! endpoint or Ollama's `/api/embeddings`; the hash implementation is a
//! deterministic local model used by tests and as an offline fallback.

use async_trait::async_trait;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use prismis_core::{Error, Result};

use crate::client::Provider;

/// Dimension of the default sentence model.
pub const DEFAULT_DIMENSION: usize = 384;

/// Combined title+text length cap, kept inside the model's token budget.
const MAX_INPUT_CHARS: usize = 5000;

/// Prepend the title (when given) and truncate to a model-safe bound.
pub fn compose_embedding_input(title: Option<&str>, text: &str) -> String {
    let combined = match title {
        Some(title) if !title.is_empty() => format!("{title}. {text}"),
        _ => text.to_string(),
    };
    if combined.chars().count() > MAX_INPUT_CHARS {
        combined.chars().take(MAX_INPUT_CHARS).collect()
    } else {
        combined
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;

    /// Embed a (title, text) pair the way the pipeline does.
    async fn embed_for_content(&self, title: Option<&str>, text: &str) -> Result<Vec<f32>> {
        self.embed_text(&compose_embedding_input(title, text)).await
    }
}

/// Embeddings over HTTP against the configured provider.
pub struct HttpEmbedder {
    provider: Provider,
    model: String,
    api_key: String,
    api_base: Option<String>,
    dimension: usize,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(
        provider: Provider,
        model: impl Into<String>,
        api_key: impl Into<String>,
        api_base: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            provider,
            model: model.into(),
            api_key: api_key.into(),
            api_base,
            dimension: DEFAULT_DIMENSION,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let (endpoint, payload) = match self.provider {
            Provider::Ollama => {
                let base = self
                    .api_base
                    .as_deref()
                    .ok_or_else(|| Error::Config("ollama embeddings require api_base".into()))?
                    .trim_end_matches('/');
                (
                    format!("{base}/api/embeddings"),
                    json!({"model": self.model, "prompt": text}),
                )
            }
            _ => {
                let base = self
                    .api_base
                    .as_deref()
                    .unwrap_or("https://api.openai.com/v1")
                    .trim_end_matches('/');
                (
                    format!("{base}/embeddings"),
                    json!({"model": self.model, "input": text, "dimensions": self.dimension}),
                )
            }
        };

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::TransientProvider(format!("embedding request failed: {e}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::TransientProvider(format!("invalid embedding response: {e}")))?;
        if !status.is_success() {
            return Err(Error::TransientProvider(format!(
                "embedding endpoint returned {status}: {body}"
            )));
        }

        // Ollama: {"embedding": [...]}; OpenAI-compatible: {"data": [{"embedding": [...]}]}
        let vector = body
            .get("embedding")
            .or_else(|| {
                body.get("data")
                    .and_then(|d| d.get(0))
                    .and_then(|row| row.get("embedding"))
            })
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::Validation(format!("embedding response missing vector: {body}"))
            })?;

        Ok(vector
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Deterministic local embedder: hashed word bigrams bucketed into a
/// normalized vector. No semantic quality, but stable across runs, which
/// is exactly what tests and offline operation need.
pub struct LocalHashEmbedder {
    dimension: usize,
}

impl LocalHashEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

impl Default for LocalHashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for LocalHashEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        let words: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        for window in words.windows(2) {
            let token = format!("{} {}", window[0].to_lowercase(), window[1].to_lowercase());
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimension;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        for word in &words {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimension;
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "local-hash-embedder"
    }
}
