//! Embedding providers and vector utilities.
//!
//! [`Embedder`] is the pluggable embedding capability used by ingestion and
//! retrieval. Implementations:
//! - **[`DisabledProvider`]**: every call fails; used when no provider is configured.
//! - **[`OpenAIProvider`]**: `POST /v1/embeddings` with batching, retry and backoff.
//! - **[`OllamaProvider`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalProvider`**: in-process fastembed models (`local-embeddings` feature).
//!
//! Vector helpers:
//! - [`cosine_similarity`] for brute-force retrieval
//! - [`vec_to_blob`] / [`blob_to_vec`] for the little-endian `f32` encoding
//!   used by cache artifacts
//!
//! # Retry Strategy
//!
//! The HTTP providers retry transient failures with exponential backoff:
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors → retry
//! - backoff 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::models::Chunk;

/// Turns text into fixed-length vectors.
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality, or 0 when unknown.
    fn dims(&self) -> usize;
    /// One vector per input text, in input order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    embedder
        .embed(&[text.to_string()])?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

/// Embed every chunk that has no vector yet, `batch_size` texts per call.
/// Returns the number of chunks embedded.
pub fn embed_chunks(embedder: &dyn Embedder, chunks: &mut [Chunk], batch_size: usize) -> Result<usize> {
    let pending: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_embedded())
        .map(|(i, _)| i)
        .collect();

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|&i| chunks[i].text.clone()).collect();
        let vectors = embedder.embed(&texts)?;
        if vectors.len() != texts.len() {
            bail!(
                "{} returned {} embeddings for {} texts",
                embedder.model_name(),
                vectors.len(),
                texts.len()
            );
        }
        let dims = embedder.dims();
        for (&i, vector) in batch.iter().zip(vectors) {
            if dims > 0 && vector.len() != dims {
                bail!(
                    "{} returned a {}-dimensional vector, expected {}",
                    embedder.model_name(),
                    vector.len(),
                    dims
                );
            }
            chunks[i].embedding = Some(vector);
        }
        debug!(batch = batch.len(), model = embedder.model_name(), "embedded batch");
    }

    Ok(pending.len())
}

// ============ Disabled Provider ============

pub struct DisabledProvider;

impl Embedder for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ HTTP helpers ============

fn http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST `body` as JSON, retrying 429/5xx and network errors.
fn post_json_with_retry(
    label: &str,
    max_retries: u32,
    body: &serde_json::Value,
    send: impl Fn(&serde_json::Value) -> reqwest::Result<reqwest::blocking::Response>,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            warn!("{} request failed, retrying in {:?} (attempt {}/{})", label, delay, attempt, max_retries);
            std::thread::sleep(delay);
        }

        match send(body) {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response.json()?);
                }

                let body_text = response.text().unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error: {}", label, e));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", label)))
}

// ============ OpenAI Provider ============

/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    max_retries: u32,
    client: reqwest::blocking::Client,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            model,
            dims,
            api_key,
            max_retries: config.max_retries,
            client: http_client(config.timeout_secs)?,
        })
    }
}

impl Embedder for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_json_with_retry("OpenAI", self.max_retries, &body, |body| {
            self.client
                .post("https://api.openai.com/v1/embeddings")
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
        })?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, json_floats(embedding)));
    }
    indexed.sort_by_key(|(i, _)| *i);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn json_floats(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

// ============ Ollama Provider ============

/// Requires Ollama running with the model pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::blocking::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            client: http_client(config.timeout_secs)?,
        })
    }
}

impl Embedder for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = format!("{}/api/embed", self.url);
        let json = post_json_with_retry("Ollama", self.max_retries, &body, |body| {
            self.client.post(&endpoint).json(body).send()
        })
        .map_err(|e| anyhow!("{} (is Ollama running at {}?)", e, self.url))?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| json_floats(values))
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}

// ============ Local Provider (fastembed) ============

/// In-process embeddings. The model is downloaded from Hugging Face on
/// first use and loaded lazily; afterwards no network calls are made.
#[cfg(feature = "local-embeddings")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: std::sync::Mutex<Option<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "bge-small-en-v1.5".to_string());
        // fail fast on unknown names
        config_to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "bge-base-en-v1.5" | "multilingual-e5-base" => 768,
            "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
            "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
            _ => 384,
        });

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: std::sync::Mutex::new(None),
        })
    }
}

#[cfg(feature = "local-embeddings")]
impl Embedder for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut guard = self
            .model
            .lock()
            .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
        if guard.is_none() {
            let model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(config_to_fastembed_model(&self.model_name)?)
                    .with_show_download_progress(true),
            )
            .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
            *guard = Some(model);
        }
        let model = guard
            .as_mut()
            .ok_or_else(|| anyhow!("local embedding model not loaded"))?;

        model
            .embed(texts.to_vec(), Some(self.batch_size))
            .map_err(|e| anyhow!("Local embedding failed: {}", e))
    }
}

#[cfg(feature = "local-embeddings")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!("Unknown local embedding model: '{}'", other),
    }
}

/// Instantiate the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (needs `--features local-embeddings`) |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as little-endian `f32` bytes.
///
/// ```rust
/// use docrag::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Reverses [`vec_to_blob`]. Trailing bytes that do not form a full `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched vectors.
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn chunk(text: &str, embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: text.to_string(),
            file_name: "a.txt".to_string(),
            file_path: "/d/a.txt".to_string(),
            page_label: None,
            chunk_index: 0,
            text: text.to_string(),
            hash: String::new(),
            embedding,
        }
    }

    #[test]
    fn embed_chunks_batches_and_skips_embedded() {
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
        };
        let mut chunks = vec![
            chunk("a", None),
            chunk("bb", Some(vec![9.0, 9.0])),
            chunk("ccc", None),
            chunk("dddd", None),
        ];

        let n = embed_chunks(&embedder, &mut chunks, 2).unwrap();
        assert_eq!(n, 3);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(chunks[0].embedding, Some(vec![1.0, 1.0]));
        assert_eq!(chunks[1].embedding, Some(vec![9.0, 9.0]));
        assert_eq!(chunks[3].embedding, Some(vec![4.0, 1.0]));

        // nothing left to do
        assert_eq!(embed_chunks(&embedder, &mut chunks, 2).unwrap(), 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn disabled_provider_fails() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.model_name(), "disabled");
        assert!(embed_query(provider.as_ref(), "hello").is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = EmbeddingConfig {
            provider: "gemini".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn openai_response_ordered_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.5, 0.5]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.5, 0.5]]);
    }

    #[test]
    fn ollama_response_parsed() {
        let json = serde_json::json!({ "embeddings": [[0.25, 0.75], [1.0, 2.0]] });
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![1.0, 2.0]);

        let bad = serde_json::json!({ "embedding": [] });
        assert!(parse_ollama_response(&bad).is_err());
    }

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn cosine_cases() {
        assert!((cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
