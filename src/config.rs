//! Command-line and environment configuration for the RagBot server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use crate::splitter::ChunkingConfig;
use crate::vector_store::{SearchType, DEFAULT_MMR_FETCH_K, DEFAULT_MMR_LAMBDA};

/// Language model backends.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum LlmProviderKind {
    /// Google Gemini via `generateContent`.
    Gemini,
    /// OpenAI chat completions.
    Openai,
}

impl LlmProviderKind {
    /// Environment variable expected to hold this provider's key.
    pub fn credential_variable(self) -> &'static str {
        match self {
            Self::Gemini => "GOOGLE_API_KEY",
            Self::Openai => "OPENAI_API_KEY",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-1.5-flash",
            Self::Openai => "gpt-4o-mini",
        }
    }
}

/// Embedding backends.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EmbedderKind {
    /// Local deterministic feature hashing.
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
}

/// Retrieval strategies exposed on the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SearchKind {
    /// Plain top-k.
    Similarity,
    /// Maximal marginal relevance.
    Mmr,
    /// Top-k above a score threshold.
    #[value(name = "similarity_score_threshold")]
    SimilarityScoreThreshold,
}

/// Settings needed to construct an LLM provider and drive generation.
#[derive(Clone, Debug, PartialEq)]
pub struct LlmSettings {
    /// Selected backend.
    pub provider: LlmProviderKind,
    /// Model identifier.
    pub model: String,
    /// API key for the selected backend, if configured.
    pub api_key: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token cap.
    pub max_output_tokens: usize,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

/// Settings for the embedding backend.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbedderSettings {
    /// Selected backend.
    pub kind: EmbedderKind,
    /// Remote model name (remote backend only).
    pub model: String,
    /// Vector width.
    pub dimensions: usize,
    /// API root for the remote backend.
    pub base_url: String,
    /// Remote API key.
    pub api_key: Option<String>,
    /// HTTP timeout.
    pub timeout: Duration,
    /// Inputs per remote request.
    pub batch_size: usize,
}

/// Fully resolved application settings.
#[derive(Clone, Debug)]
pub struct AppSettings {
    /// HTTP listen address.
    pub bind: SocketAddr,
    /// Directory holding persisted indexes.
    pub persist_dir: PathBuf,
    /// Name of the persisted index.
    pub index_name: String,
    /// Splitter parameters.
    pub chunking: ChunkingConfig,
    /// Chunks returned per question.
    pub top_k: usize,
    /// Retrieval strategy.
    pub search: SearchType,
    /// Exchanges kept in chain memory.
    pub memory_window: usize,
    /// LLM construction settings.
    pub llm: LlmSettings,
    /// Embedder construction settings.
    pub embedder: EmbedderSettings,
}

/// Command-line interface for the `ragbot` binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ragbot",
    version,
    about = "Chat with uploaded PDF documents using retrieval-augmented generation"
)]
pub struct Cli {
    /// Address to bind the HTTP server to (host:port)
    #[arg(long, env = "RAGBOT_BIND", default_value = "127.0.0.1:8501")]
    pub bind: String,

    /// Directory for the persisted vector index
    #[arg(long, env = "RAGBOT_PERSIST_DIR", default_value = "vectorstore")]
    pub persist_dir: PathBuf,

    /// Name of the persisted vector index
    #[arg(long, env = "RAGBOT_INDEX_NAME", default_value = "doc_index")]
    pub index_name: String,

    /// Maximum characters per chunk
    #[arg(long, default_value_t = 1000)]
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks
    #[arg(long, default_value_t = 200)]
    pub chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, default_value_t = 4)]
    pub top_k: usize,

    /// Retrieval strategy
    #[arg(long, value_enum, default_value = "similarity")]
    pub search_type: SearchKind,

    /// Minimum score for similarity-score-threshold retrieval
    #[arg(long, default_value_t = 0.5)]
    pub score_threshold: f32,

    /// Language model backend
    #[arg(long, value_enum, env = "RAGBOT_LLM_PROVIDER", default_value = "gemini")]
    pub llm_provider: LlmProviderKind,

    /// Google API key for Gemini
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    /// OpenAI API key (required when --llm-provider openai)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Chat model identifier (defaults per provider)
    #[arg(long, env = "RAGBOT_MODEL")]
    pub model: Option<String>,

    /// Sampling temperature for answers
    #[arg(long, default_value_t = 0.7)]
    pub temperature: f32,

    /// Past exchanges included in each prompt
    #[arg(long, default_value_t = 10)]
    pub memory_window: usize,

    /// Maximum tokens requested per answer
    #[arg(long, default_value_t = 1024)]
    pub max_output_tokens: usize,

    /// Seconds before LLM requests time out
    #[arg(long, default_value_t = 60)]
    pub llm_timeout_secs: u64,

    /// Embedding backend
    #[arg(long, value_enum, env = "RAGBOT_EMBEDDER", default_value = "hashing")]
    pub embedder: EmbedderKind,

    /// Remote embedding model name
    #[arg(long, default_value = "text-embedding-3-small")]
    pub embedding_model: String,

    /// Embedding vector width
    #[arg(long, default_value_t = 768)]
    pub embedding_dimensions: usize,

    /// Base URL for OpenAI-compatible embedding endpoints
    #[arg(long, default_value = "https://api.openai.com/v1")]
    pub embedding_base_url: String,

    /// API key for the remote embedding endpoint (falls back to OPENAI_API_KEY)
    #[arg(long, env = "RAGBOT_EMBEDDING_API_KEY", hide_env_values = true)]
    pub embedding_api_key: Option<String>,

    /// Seconds before embedding requests time out
    #[arg(long, default_value_t = 30)]
    pub embedding_timeout_secs: u64,

    /// Max inputs per embedding request
    #[arg(long, default_value_t = 32)]
    pub embedding_batch: usize,
}

impl Cli {
    /// Converts the parsed CLI into validated `AppSettings`.
    pub fn build_settings(&self) -> Result<AppSettings> {
        let bind: SocketAddr = self
            .bind
            .parse()
            .with_context(|| format!("invalid bind address {}", self.bind))?;
        let chunking = ChunkingConfig::new(self.chunk_size, self.chunk_overlap)
            .context("invalid chunking parameters")?;
        anyhow::ensure!(self.top_k > 0, "--top-k must be at least 1");
        anyhow::ensure!(
            !self.index_name.trim().is_empty(),
            "--index-name must not be empty"
        );
        Ok(AppSettings {
            bind,
            persist_dir: self.persist_dir.clone(),
            index_name: self.index_name.trim().to_string(),
            chunking,
            top_k: self.top_k,
            search: self.search_type(),
            memory_window: self.memory_window,
            llm: self.llm_settings(),
            embedder: self.embedder_settings(),
        })
    }

    fn search_type(&self) -> SearchType {
        match self.search_type {
            SearchKind::Similarity => SearchType::Similarity,
            SearchKind::Mmr => SearchType::Mmr {
                fetch_k: DEFAULT_MMR_FETCH_K,
                lambda: DEFAULT_MMR_LAMBDA,
            },
            SearchKind::SimilarityScoreThreshold => SearchType::SimilarityScoreThreshold {
                threshold: self.score_threshold,
            },
        }
    }

    fn llm_settings(&self) -> LlmSettings {
        let api_key = match self.llm_provider {
            LlmProviderKind::Gemini => self.google_api_key.clone(),
            LlmProviderKind::Openai => self.openai_api_key.clone(),
        };
        LlmSettings {
            provider: self.llm_provider,
            model: self
                .model
                .clone()
                .filter(|model| !model.trim().is_empty())
                .unwrap_or_else(|| self.llm_provider.default_model().to_string()),
            api_key,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens.max(1),
            timeout_secs: self.llm_timeout_secs,
        }
    }

    fn embedder_settings(&self) -> EmbedderSettings {
        EmbedderSettings {
            kind: self.embedder,
            model: self.embedding_model.clone(),
            dimensions: self.embedding_dimensions,
            base_url: self.embedding_base_url.clone(),
            api_key: self
                .embedding_api_key
                .clone()
                .or_else(|| self.openai_api_key.clone()),
            timeout: Duration::from_secs(self.embedding_timeout_secs.max(1)),
            batch_size: self.embedding_batch.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["ragbot"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse")
    }

    #[test]
    fn explicit_flags_override_defaults() {
        let settings = parse(&[
            "--bind",
            "0.0.0.0:9000",
            "--chunk-size",
            "500",
            "--chunk-overlap",
            "50",
            "--search-type",
            "mmr",
            "--llm-provider",
            "openai",
            "--openai-api-key",
            "sk-test",
        ])
        .build_settings()
        .expect("settings");
        assert_eq!(settings.bind.port(), 9000);
        assert_eq!(settings.chunking.chunk_size(), 500);
        assert_eq!(settings.chunking.chunk_overlap(), 50);
        assert_eq!(
            settings.search,
            SearchType::Mmr {
                fetch_k: 20,
                lambda: 0.5
            }
        );
        assert_eq!(settings.llm.provider, LlmProviderKind::Openai);
        assert_eq!(settings.llm.model, "gpt-4o-mini");
        assert_eq!(settings.llm.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let err = parse(&["--chunk-size", "100", "--chunk-overlap", "100"])
            .build_settings()
            .expect_err("rejected");
        assert!(err.to_string().contains("chunking"));
    }

    #[test]
    fn rejects_bad_bind_address() {
        assert!(parse(&["--bind", "not-an-address"]).build_settings().is_err());
    }

    #[test]
    fn score_threshold_search_carries_threshold() {
        let settings = parse(&[
            "--search-type",
            "similarity_score_threshold",
            "--score-threshold",
            "0.25",
        ])
        .build_settings()
        .expect("settings");
        assert_eq!(
            settings.search,
            SearchType::SimilarityScoreThreshold { threshold: 0.25 }
        );
    }
}
