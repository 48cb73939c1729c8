//! Embedding generation via HTTP backends.
//!
//! Embeddings are never computed in-process: texts go to either a local
//! Ollama instance or a hosted OpenAI-compatible API, selected by the
//! configured provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::{Provider, Settings};

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("embedding backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("embedding count mismatch: sent {sent}, received {received}")]
    CountMismatch { sent: usize, received: usize },
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Turns text into fixed-length vectors. The trait seam exists so tests
/// can run the pipeline with a deterministic in-process implementation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed each text, preserving order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Production embedder speaking the Ollama or OpenAI embedding API.
pub struct HttpEmbedder {
    client: reqwest::Client,
    provider: Provider,
    model: String,
    api_key: Option<String>,
    base_url: String,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingRow>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            provider: settings.provider,
            model: settings.embedding_model.clone(),
            api_key: settings.openai_api_key.clone(),
            base_url: settings.ollama_base_url.clone(),
        })
    }

    /// One request per text; the Ollama embeddings endpoint is single-prompt.
    async fn embed_ollama(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let response = self
                .client
                .post(&url)
                .json(&json!({ "model": self.model, "prompt": text }))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(backend_error(response).await);
            }

            let parsed: OllamaEmbeddingResponse = response.json().await?;
            out.push(parsed.embedding);
        }
        Ok(out)
    }

    async fn embed_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = self.api_key.as_deref().ok_or(EmbeddingError::MissingApiKey)?;

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(api_key)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let parsed: OpenAiEmbeddingResponse = response.json().await?;
        let mut rows = parsed.data;
        rows.sort_by_key(|r| r.index);
        let out: Vec<Vec<f32>> = rows.into_iter().map(|r| r.embedding).collect();

        if out.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                sent: texts.len(),
                received: out.len(),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        match self.provider {
            Provider::Ollama => self.embed_ollama(texts).await,
            Provider::OpenAi => self.embed_openai(texts).await,
        }
    }
}

async fn backend_error(response: reqwest::Response) -> EmbeddingError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    EmbeddingError::Backend { status, message }
}
