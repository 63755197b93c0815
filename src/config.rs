use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory where uploaded files are kept.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// A native-extracted page with fewer trimmed characters than this is
    /// treated as scanned and re-run through OCR.
    #[serde(default = "default_min_chars_per_page")]
    pub min_chars_per_page: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_chars_per_page: default_min_chars_per_page(),
        }
    }
}

fn default_min_chars_per_page() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in characters.
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    /// Overlap between consecutive windows, in characters.
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    500
}
fn default_overlap_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"hash"` (offline, deterministic) or `"openai"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    256
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    /// `"disabled"` or `"remote"`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    /// Endpoint for the remote OCR capability.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_lang")]
    pub language: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            endpoint: None,
            language: default_lang(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_lang() -> String {
    "eng".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `"disabled"` or `"openai"`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Hard bound on a single completion call.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Total characters of evidence included in the prompt.
    #[serde(default = "default_context_budget")]
    pub context_budget_chars: usize,
    /// Hard cap on the returned answer length.
    #[serde(default = "default_max_answer_chars")]
    pub max_answer_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            timeout_secs: default_llm_timeout_secs(),
            context_budget_chars: default_context_budget(),
            max_answer_chars: default_max_answer_chars(),
        }
    }
}

fn default_llm_timeout_secs() -> u64 {
    20
}
fn default_context_budget() -> usize {
    6000
}
fn default_max_answer_chars() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    /// Evidence snippet length in characters.
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_top_k() -> usize {
    50
}
fn default_snippet_chars() -> usize {
    240
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8600".to_string()
}

impl EmbeddingConfig {
    pub fn is_remote(&self) -> bool {
        self.provider == "openai"
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_chars == 0 {
        anyhow::bail!("chunking.chunk_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.chunk_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.chunk_chars");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "hash" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash or openai.",
            other
        ),
    }
    if config.embedding.is_remote() && config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    match config.ocr.provider.as_str() {
        "disabled" => {}
        "remote" => {
            if config.ocr.endpoint.is_none() {
                anyhow::bail!("ocr.endpoint must be specified when provider is 'remote'");
            }
        }
        other => anyhow::bail!("Unknown OCR provider: '{}'. Must be disabled or remote.", other),
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!("Unknown LLM provider: '{}'. Must be disabled or openai.", other),
    }
    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    if config.retrieval.default_top_k == 0
        || config.retrieval.default_top_k > config.retrieval.max_top_k
    {
        anyhow::bail!("retrieval.default_top_k must be in 1..=retrieval.max_top_k");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse(r#"[db]
path = "./data/docsense.sqlite""#)
        .unwrap();
        assert_eq!(config.chunking.chunk_chars, 500);
        assert_eq!(config.chunking.overlap_chars, 50);
        assert_eq!(config.extraction.min_chars_per_page, 50);
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.embedding.dims, 256);
        assert_eq!(config.llm.provider, "disabled");
        assert_eq!(config.retrieval.default_top_k, 5);
    }

    #[test]
    fn rejects_overlap_not_below_window() {
        let err = parse(
            r#"[db]
path = "x.sqlite"
[chunking]
chunk_chars = 100
overlap_chars = 100"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap_chars"));
    }

    #[test]
    fn rejects_unknown_providers() {
        let err = parse(
            r#"[db]
path = "x.sqlite"
[embedding]
provider = "quantum""#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn remote_ocr_requires_endpoint() {
        let err = parse(
            r#"[db]
path = "x.sqlite"
[ocr]
provider = "remote""#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("ocr.endpoint"));
    }

    #[test]
    fn llm_requires_model_when_enabled() {
        let err = parse(
            r#"[db]
path = "x.sqlite"
[llm]
provider = "openai""#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("llm.model"));
    }
}
