use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_INDEX_DIR: &str = "vector_index";
const DEFAULT_EMBEDDING_MODEL: &str = "mxbai-embed-large";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1024;
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 16;
const DEFAULT_LLM_MODEL: &str = "deepseek-r1:latest";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CHUNK_OVERLAP: usize = 100;
const DEFAULT_RETRIEVAL_K: usize = 5;
const DEFAULT_SCORE_THRESHOLD: f32 = 0.2;
const DEFAULT_BATCH_DIR: &str = "cases";
const DEFAULT_BATCH_PATTERN: &str = "*.txt";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for Ragdesk.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory holding the persisted vector index.
    pub index_dir: PathBuf,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Number of chunks sent to the embedding provider per request.
    pub embedding_batch_size: usize,
    /// Language model backend used to answer questions.
    pub llm_provider: LlmProvider,
    /// Completion model identifier passed to the provider.
    pub llm_model: String,
    /// Optional sampling temperature forwarded to the language model.
    pub llm_temperature: Option<f32>,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: String,
    /// Base URL of an OpenAI-compatible API.
    pub openai_base_url: String,
    /// Bearer token for the OpenAI-compatible API.
    pub openai_api_key: Option<String>,
    /// Optional override for the automatic chunk size selection.
    pub text_splitter_chunk_size: Option<usize>,
    /// Token overlap carried between adjacent chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Prefer smaller automatically derived chunks.
    pub text_splitter_use_safe_defaults: bool,
    /// Initial number of passages retrieved per question.
    pub retrieval_default_k: usize,
    /// Initial minimum similarity score for retrieved passages.
    pub retrieval_default_score_threshold: f32,
    /// Default source directory for batch runs.
    pub batch_dir: PathBuf,
    /// Default file-name glob for batch runs.
    pub batch_pattern: String,
}

/// Supported embedding backends for the ingestion pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible embeddings API.
    OpenAI,
    /// Deterministic feature-hashing embedder that needs no external service.
    Hashing,
}

/// Supported language model backends for answering questions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible chat completions API.
    OpenAI,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Blank values are treated as absent so that `FOO=` in a `.env` file falls back to the
    /// default instead of failing to parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let embedding_provider = match get("EMBEDDING_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            None => EmbeddingProvider::Ollama,
        };
        let llm_provider = match get("LLM_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("LLM_PROVIDER".to_string()))?,
            None => LlmProvider::Ollama,
        };

        let openai_api_key = get("OPENAI_API_KEY");
        let needs_openai =
            embedding_provider == EmbeddingProvider::OpenAI || llm_provider == LlmProvider::OpenAI;
        if needs_openai && openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".to_string()));
        }

        let embedding_dimension = parse_or(&get, "EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?;
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()));
        }
        let embedding_batch_size =
            parse_or(&get, "EMBEDDING_BATCH_SIZE", DEFAULT_EMBEDDING_BATCH_SIZE)?.max(1);

        let retrieval_default_score_threshold: f32 = parse_or(
            &get,
            "RETRIEVAL_DEFAULT_SCORE_THRESHOLD",
            DEFAULT_SCORE_THRESHOLD,
        )?;
        if !retrieval_default_score_threshold.is_finite() {
            return Err(ConfigError::InvalidValue(
                "RETRIEVAL_DEFAULT_SCORE_THRESHOLD".to_string(),
            ));
        }

        Ok(Self {
            index_dir: get("RAGDESK_INDEX_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_DIR)),
            embedding_provider,
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension,
            embedding_batch_size,
            llm_provider,
            llm_model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_temperature: parse_optional(&get, "LLM_TEMPERATURE")?,
            ollama_url: get("OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            openai_api_key,
            text_splitter_chunk_size: parse_optional(&get, "TEXT_SPLITTER_CHUNK_SIZE")?,
            text_splitter_chunk_overlap: parse_or(
                &get,
                "TEXT_SPLITTER_CHUNK_OVERLAP",
                DEFAULT_CHUNK_OVERLAP,
            )?,
            text_splitter_use_safe_defaults: parse_flag(&get, "TEXT_SPLITTER_USE_SAFE_DEFAULTS")?,
            retrieval_default_k: parse_or(&get, "RETRIEVAL_DEFAULT_K", DEFAULT_RETRIEVAL_K)?
                .clamp(1, 10),
            retrieval_default_score_threshold: retrieval_default_score_threshold.clamp(0.0, 1.0),
            batch_dir: get("BATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BATCH_DIR)),
            batch_pattern: get("BATCH_PATTERN")
                .unwrap_or_else(|| DEFAULT_BATCH_PATTERN.to_string()),
        })
    }
}

fn parse_optional<T, G>(get: &G, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    Ok(parse_optional(get, key)?.unwrap_or(default))
}

fn parse_flag<G>(get: &G, key: &str) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|value| value.trim().to_lowercase()) {
        None => Ok(false),
        Some(value) => match value.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hashing" | "hash" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        index_dir = %config.index_dir.display(),
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        llm_provider = ?config.llm_provider,
        llm_model = %config.llm_model,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = config_from(&[]).expect("defaults load");
        assert_eq!(config.index_dir, PathBuf::from("vector_index"));
        assert_eq!(config.embedding_provider, EmbeddingProvider::Ollama);
        assert_eq!(config.llm_provider, LlmProvider::Ollama);
        assert_eq!(config.llm_model, "deepseek-r1:latest");
        assert_eq!(config.retrieval_default_k, 5);
        assert!((config.retrieval_default_score_threshold - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.batch_pattern, "*.txt");
        assert_eq!(config.text_splitter_chunk_overlap, 100);
        assert!(config.text_splitter_chunk_size.is_none());
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[("EMBEDDING_MODEL", "   "), ("BATCH_DIR", "")]).unwrap();
        assert_eq!(config.embedding_model, "mxbai-embed-large");
        assert_eq!(config.batch_dir, PathBuf::from("cases"));
    }

    #[test]
    fn openai_provider_requires_api_key() {
        let error = config_from(&[("LLM_PROVIDER", "openai")]).unwrap_err();
        assert!(matches!(error, ConfigError::MissingVariable(name) if name == "OPENAI_API_KEY"));

        let config = config_from(&[("LLM_PROVIDER", "OpenAI"), ("OPENAI_API_KEY", "sk-test")])
            .expect("key supplied");
        assert_eq!(config.llm_provider, LlmProvider::OpenAI);
    }

    #[test]
    fn invalid_values_are_reported_by_name() {
        let error = config_from(&[("EMBEDDING_DIMENSION", "wide")]).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(name) if name == "EMBEDDING_DIMENSION"));

        let error = config_from(&[("EMBEDDING_PROVIDER", "word2vec")]).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(name) if name == "EMBEDDING_PROVIDER"));

        let error = config_from(&[("TEXT_SPLITTER_USE_SAFE_DEFAULTS", "maybe")]).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn retrieval_defaults_are_clamped_into_slider_ranges() {
        let config = config_from(&[
            ("RETRIEVAL_DEFAULT_K", "42"),
            ("RETRIEVAL_DEFAULT_SCORE_THRESHOLD", "1.5"),
        ])
        .unwrap();
        assert_eq!(config.retrieval_default_k, 10);
        assert!((config.retrieval_default_score_threshold - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn hashing_provider_and_flags_parse() {
        let config = config_from(&[
            ("EMBEDDING_PROVIDER", "hashing"),
            ("EMBEDDING_DIMENSION", "256"),
            ("TEXT_SPLITTER_USE_SAFE_DEFAULTS", "1"),
            ("TEXT_SPLITTER_CHUNK_SIZE", "64"),
        ])
        .unwrap();
        assert_eq!(config.embedding_provider, EmbeddingProvider::Hashing);
        assert_eq!(config.embedding_dimension, 256);
        assert!(config.text_splitter_use_safe_defaults);
        assert_eq!(config.text_splitter_chunk_size, Some(64));
    }
}
