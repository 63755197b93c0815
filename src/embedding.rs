//! Embedding capability: provider abstraction and implementations.
//!
//! The embedder is a pure mapping `text → fixed-dimension vector`; the actual
//! model lives behind the [`EmbeddingProvider`] trait:
//!
//! - **[`HashProvider`]** (default) — offline, deterministic token-hashing
//!   embedder. No network, no model downloads; identical text always maps to
//!   the identical vector, which makes the whole pipeline testable.
//! - **[`OpenAiProvider`]** — calls the OpenAI embeddings API with batching,
//!   timeout, and exponential backoff retry (429/5xx retried, other 4xx fail
//!   immediately).
//!
//! Also provides the vector utilities shared with the index:
//! [`cosine_similarity`], [`vec_to_blob`], and [`blob_to_vec`] (little-endian
//! f32 BLOB codec for SQLite storage).

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;

/// An external embedding capability. Stateless from the caller's view:
/// the same input must always produce a vector of [`dims`](Self::dims) floats.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier for bookkeeping (e.g. `"hash-256"`).
    fn model_name(&self) -> String;
    /// Embedding dimensionality.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embed a single query text.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    text: &str,
) -> Result<Vec<f32>, EmbeddingError> {
    let results = provider.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| EmbeddingError::CapabilityUnavailable("empty embedding response".into()))
}

/// Create the provider named in the configuration.
pub fn create_provider(
    config: &EmbeddingConfig,
) -> Result<Box<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.as_str() {
        "hash" => Ok(Box::new(HashProvider::new(config.dims))),
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        other => Err(EmbeddingError::CapabilityUnavailable(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Hash provider ============

/// Deterministic token-hashing embedder.
///
/// Each lowercase alphanumeric token is hashed (SHA-256) into one of `dims`
/// buckets; bucket counts are L2-normalized. Crude semantically, but offline
/// and fully reproducible.
pub struct HashProvider {
    dims: usize,
}

impl HashProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let lowered = token.to_lowercase();
            let digest = Sha256::digest(lowered.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dims;
            vec[bucket] += 1.0;
        }

        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> String {
        format!("hash-{}", self.dims)
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ============ OpenAI provider ============

/// Embedding provider backed by `POST https://api.openai.com/v1/embeddings`.
///
/// Requires `OPENAI_API_KEY` in the environment. Transient failures (HTTP 429,
/// 5xx, network errors) are retried with exponential backoff capped at 32s;
/// other client errors fail immediately.
pub struct OpenAiProvider {
    model: String,
    dims: usize,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let model = config.model.clone().ok_or_else(|| {
            EmbeddingError::CapabilityUnavailable(
                "embedding.model required for openai provider".into(),
            )
        })?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(EmbeddingError::CapabilityUnavailable(
                "OPENAI_API_KEY environment variable not set".into(),
            ));
        }
        Ok(Self {
            model,
            dims: config.dims,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> String {
        self.model.clone()
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            EmbeddingError::CapabilityUnavailable("OPENAI_API_KEY not set".into())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::CapabilityUnavailable(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            EmbeddingError::CapabilityUnavailable(e.to_string())
                        })?;
                        return parse_openai_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(EmbeddingError::CapabilityUnavailable(format!(
                            "OpenAI API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(EmbeddingError::CapabilityUnavailable(format!(
                        "OpenAI API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(EmbeddingError::CapabilityUnavailable(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            EmbeddingError::CapabilityUnavailable("embedding failed after retries".into())
        }))
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        EmbeddingError::CapabilityUnavailable("invalid OpenAI response: missing data array".into())
    })?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                EmbeddingError::CapabilityUnavailable(
                    "invalid OpenAI response: missing embedding".into(),
                )
            })?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty or
/// mismatched-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
