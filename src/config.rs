use crate::qdrant::Distance;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

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

/// Runtime configuration for the ingestion worker.
#[derive(Debug, Clone)]
pub struct Config {
    /// AMQP URI of the broker that carries document jobs.
    pub amqp_url: String,
    /// Name of the durable queue consumed by the worker.
    pub queue_name: String,
    /// Connection string of the relational metadata store.
    pub database_url: String,
    /// Base URL that documents are fetched from (`{base}/{storage_key}`).
    pub document_store_url: String,
    /// Optional bearer token presented to the document store.
    pub document_store_token: Option<String>,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Distance metric used for newly created tenant collections.
    pub vector_distance: Distance,
    /// API key for OpenAI-compatible embedding endpoints.
    pub openai_api_key: Option<String>,
    /// Base URL for OpenAI-compatible embedding endpoints.
    pub openai_base_url: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Maximum number of texts sent in one embedding request.
    pub embedding_max_batch: usize,
    /// Token budget per embedding request; `None` disables token accounting.
    pub embedding_max_batch_tokens: Option<usize>,
    /// Number of embedding requests allowed in flight for one document.
    pub embedding_concurrency: usize,
    /// Timeout applied to each embedding request, in seconds.
    pub embedding_timeout_secs: u64,
    /// Attempts made by the embedding client before surfacing a failure.
    pub embedding_max_retries: usize,
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks.
    pub chunk_overlap: usize,
    /// Maximum number of points per upsert request.
    pub upsert_batch_size: usize,
    /// Optional port for the health/metrics probe server.
    pub health_port: Option<u16>,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI (or compatible) embeddings API.
    OpenAI,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let embedding_provider = match vars.optional("EMBEDDING_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            None => EmbeddingProvider::OpenAI,
        };
        let openai_api_key = vars.optional("OPENAI_API_KEY");
        if embedding_provider == EmbeddingProvider::OpenAI && openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".to_string()));
        }

        let chunk_size: usize = vars.parse_or("CHUNK_SIZE", 1000)?;
        let chunk_overlap: usize = vars.parse_or("CHUNK_OVERLAP", 200)?;
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP".to_string()));
        }

        let max_batch_tokens: usize = vars.parse_or("EMBEDDING_MAX_BATCH_TOKENS", 300_000)?;

        Ok(Self {
            amqp_url: vars.required("RABBIT_MQ_URL")?,
            queue_name: vars
                .optional("QUEUE_NAME")
                .unwrap_or_else(|| "document_process_queue".to_string()),
            database_url: vars.required("DATABASE_URL")?,
            document_store_url: vars.required("DOCUMENT_STORE_URL")?,
            document_store_token: vars.optional("DOCUMENT_STORE_TOKEN"),
            qdrant_url: vars.required("QDRANT_URL")?,
            qdrant_api_key: vars.optional("QDRANT_API_KEY"),
            embedding_provider,
            embedding_model: vars
                .optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            embedding_dimension: vars.positive("EMBEDDING_DIMENSION", 1536)?,
            vector_distance: match vars.optional("VECTOR_DISTANCE") {
                Some(value) => value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("VECTOR_DISTANCE".to_string()))?,
                None => Distance::Cosine,
            },
            openai_api_key,
            openai_base_url: vars
                .optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            ollama_url: vars
                .optional("OLLAMA_URL")
                .unwrap_or_else(|| "http://127.0.0.1:11434".to_string()),
            embedding_max_batch: vars.positive("EMBEDDING_MAX_BATCH", 1000)?,
            embedding_max_batch_tokens: (max_batch_tokens > 0).then_some(max_batch_tokens),
            embedding_concurrency: vars.positive("EMBEDDING_CONCURRENCY", 1)?,
            embedding_timeout_secs: vars.positive("EMBEDDING_TIMEOUT_SECS", 60)?,
            embedding_max_retries: vars.positive("EMBEDDING_MAX_RETRIES", 3)?,
            chunk_size,
            chunk_overlap,
            upsert_batch_size: vars.positive("UPSERT_BATCH_SIZE", 100)?,
            health_port: vars
                .optional("HEALTH_PORT")
                .map(|value| {
                    value
                        .trim()
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("HEALTH_PORT".into()))
                })
                .transpose()?,
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string())),
            None => Ok(default),
        }
    }

    fn positive<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default,
    {
        let value = self.parse_or(key, default)?;
        if value > T::default() {
            Ok(value)
        } else {
            Err(ConfigError::InvalidValue(key.to_string()))
        }
    }
}

impl FromStr for EmbeddingProvider {
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

/// Load configuration from the environment and install it in the global cache.
///
/// Later calls return the configuration installed by the first one.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}
