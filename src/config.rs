use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::index::IndexPaths;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Locations of the pipeline artifacts.
#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_pages_path")]
    pub pages: PathBuf,
    #[serde(default = "default_chunks_path")]
    pub chunks: PathBuf,
    #[serde(default = "default_embeddings_path")]
    pub embeddings: PathBuf,
    #[serde(default = "default_index_path")]
    pub index: PathBuf,
    #[serde(default = "default_metadata_path")]
    pub metadata: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            pages: default_pages_path(),
            chunks: default_chunks_path(),
            embeddings: default_embeddings_path(),
            index: default_index_path(),
            metadata: default_metadata_path(),
        }
    }
}

impl PathsConfig {
    pub fn index_paths(&self) -> IndexPaths {
        IndexPaths::new(&self.index, &self.metadata)
    }
}

fn default_pages_path() -> PathBuf {
    PathBuf::from("ingested/pages.json")
}
fn default_chunks_path() -> PathBuf {
    PathBuf::from("ingested/chunks.json")
}
fn default_embeddings_path() -> PathBuf {
    PathBuf::from("ingested/embeddings.json")
}
fn default_index_path() -> PathBuf {
    PathBuf::from("ingested/index.npy")
}
fn default_metadata_path() -> PathBuf {
    PathBuf::from("ingested/metadata.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size_words")]
    pub chunk_size_words: usize,
    #[serde(default = "default_image_snippet_chars")]
    pub image_snippet_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_words: default_chunk_size_words(),
            image_snippet_chars: default_image_snippet_chars(),
        }
    }
}

fn default_chunk_size_words() -> usize {
    300
}
fn default_image_snippet_chars() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    /// Where the local provider caches downloaded models.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
            cache_dir: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Characters of chunk text kept in each metadata record.
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_snippet_chars() -> usize {
    800
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    /// Hits scoring below this are not used for grounding.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Number of hits stitched into the extractive fallback.
    #[serde(default = "default_fallback_hits")]
    pub fallback_hits: usize,
    /// Per-hit character budget in the extractive fallback.
    #[serde(default = "default_snippet_chars")]
    pub fallback_snippet_chars: usize,
    /// Only call the generative backend when explicitly preferred.
    #[serde(default)]
    pub extractive_by_default: bool,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            fallback_hits: default_fallback_hits(),
            fallback_snippet_chars: default_snippet_chars(),
            extractive_by_default: false,
        }
    }
}

fn default_similarity_threshold() -> f32 {
    0.75
}
fn default_fallback_hits() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            api_key_env: None,
            base_url: None,
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}
fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_output_tokens() -> usize {
    400
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Name of the environment variable the credential is read from.
    pub fn api_key_var(&self) -> &str {
        match (&self.api_key_env, self.provider.as_str()) {
            (Some(var), _) => var,
            (None, "anthropic") => "ANTHROPIC_API_KEY",
            (None, _) => "OPENAI_API_KEY",
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size_words == 0 {
            anyhow::bail!("chunking.chunk_size_words must be > 0");
        }

        if self.retrieval.top_k < 1 {
            anyhow::bail!("retrieval.top_k must be >= 1");
        }

        if !(-1.0..=1.0).contains(&self.answer.similarity_threshold) {
            anyhow::bail!("answer.similarity_threshold must be in [-1.0, 1.0]");
        }
        if self.answer.fallback_hits < 1 {
            anyhow::bail!("answer.fallback_hits must be >= 1");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "local" | "openai" | "ollama" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, local, openai, or ollama.",
                other
            ),
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
        if matches!(self.embedding.provider.as_str(), "openai" | "ollama") {
            if self.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        match self.generation.provider.as_str() {
            "disabled" | "openai" | "anthropic" => {}
            other => anyhow::bail!(
                "Unknown generation provider: '{}'. Must be disabled, openai, or anthropic.",
                other
            ),
        }
        if self.generation.timeout_secs == 0 {
            anyhow::bail!("generation.timeout_secs must be > 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.chunking.chunk_size_words, 300);
        assert_eq!(config.chunking.image_snippet_chars, 1000);
        assert_eq!(config.index.snippet_chars, 800);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.answer.similarity_threshold - 0.75).abs() < 1e-6);
        assert_eq!(config.answer.fallback_hits, 3);
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.generation.provider, "openai");
        assert_eq!(config.paths.index, PathBuf::from("ingested/index.npy"));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = parse("[answer]\nsimilarity_threshold = 0.5\n").unwrap();
        assert!((config.answer.similarity_threshold - 0.5).abs() < 1e-6);
        assert_eq!(config.answer.fallback_snippet_chars, 800);
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        assert!(parse("[chunking]\nchunk_size_words = 0\n").is_err());
    }

    #[test]
    fn test_rejects_zero_top_k() {
        assert!(parse("[retrieval]\ntop_k = 0\n").is_err());
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        assert!(parse("[answer]\nsimilarity_threshold = 1.5\n").is_err());
    }

    #[test]
    fn test_rejects_unknown_providers() {
        assert!(parse("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse("[generation]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_remote_embedding_requires_model_and_dims() {
        assert!(parse("[embedding]\nprovider = \"openai\"\n").is_err());
        let ok = parse(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n",
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_rejects_unbounded_generation_timeout() {
        assert!(parse("[generation]\ntimeout_secs = 0\n").is_err());
    }

    #[test]
    fn test_api_key_var_per_provider() {
        let mut generation = GenerationConfig::default();
        assert_eq!(generation.api_key_var(), "OPENAI_API_KEY");
        generation.provider = "anthropic".to_string();
        assert_eq!(generation.api_key_var(), "ANTHROPIC_API_KEY");
        generation.api_key_env = Some("MY_KEY".to_string());
        assert_eq!(generation.api_key_var(), "MY_KEY");
    }
}
