//! Environment-driven service configuration.

use std::env;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidInt { name: &'static str, value: String },

    #[error("CHUNK_OVERLAP ({overlap}) must be smaller than CHUNK_SIZE ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },

    #[error("TOP_K must be at least 1")]
    ZeroTopK,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chat and embedding backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Local Ollama instance, no credential required.
    Ollama,
    /// Hosted OpenAI-compatible API, requires `OPENAI_API_KEY`.
    OpenAi,
}

impl Provider {
    /// Anything other than "openai" (case-insensitive) selects Ollama.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("openai") {
            Provider::OpenAi
        } else {
            Provider::Ollama
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::OpenAi => "openai",
        }
    }
}

/// Service settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding the vector index database.
    pub index_dir: PathBuf,
    /// Directory where uploaded PDFs are written.
    pub upload_dir: PathBuf,
    /// Embedding model identifier passed to the embedding backend.
    pub embedding_model: String,
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
    /// Default number of results returned by retrieval.
    pub top_k: usize,
    /// Backend used for both embeddings and answer generation.
    pub provider: Provider,
    /// Chat model identifier.
    pub llm_model: String,
    /// Credential for the hosted backend.
    pub openai_api_key: Option<String>,
    /// Base URL of the local Ollama instance.
    pub ollama_base_url: String,
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidInt { name, value: raw }),
        Err(_) => Ok(default),
    }
}

impl Settings {
    /// Read settings from the environment, validating numeric values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let chunk_size = env_usize("CHUNK_SIZE", 1000)?;
        let chunk_overlap = env_usize("CHUNK_OVERLAP", 150)?;
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }

        let top_k = env_usize("TOP_K", 4)?;
        if top_k == 0 {
            return Err(ConfigError::ZeroTopK);
        }

        let openai_api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        Ok(Self {
            index_dir: PathBuf::from(env_or("INDEX_DIR", "./storage/index")),
            upload_dir: PathBuf::from(env_or("UPLOAD_DIR", "./storage/uploads")),
            embedding_model: env_or("EMBEDDING_MODEL", "nomic-embed-text"),
            chunk_size,
            chunk_overlap,
            top_k,
            provider: Provider::parse(&env_or("LLM_PROVIDER", "ollama")),
            llm_model: env_or("LLM_MODEL", "llama3.2:1b"),
            openai_api_key,
            ollama_base_url: env_or("OLLAMA_BASE_URL", "http://127.0.0.1:11434")
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Create the storage directories if they do not exist.
    pub fn init_dirs(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.index_dir)?;
        fs::create_dir_all(&self.upload_dir)?;
        Ok(())
    }

    /// Path of the vector index database inside the index directory.
    pub fn index_db_path(&self) -> PathBuf {
        self.index_dir.join("docqa.sqlite3")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(Provider::parse("openai"), Provider::OpenAi);
        assert_eq!(Provider::parse("OpenAI"), Provider::OpenAi);
        assert_eq!(Provider::parse("ollama"), Provider::Ollama);
        assert_eq!(Provider::parse("anything-else"), Provider::Ollama);
    }
}
