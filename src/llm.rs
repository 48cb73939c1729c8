//! Answer generation: prompt assembly plus the chat-completion adapter.
//!
//! One prompt string serves both backends. The hosted backend gets a
//! short timeout, the local one a long timeout, reflecting expected
//! latency. Replies are decoded defensively because the backend contract
//! is not fully trusted.

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{Provider, Settings};

/// Fixed assistant persona prepended to every prompt.
const SYSTEM_INSTRUCTION: &str = "\
You are an assistant that answers using information in CONTEXT.
If information is not in context, answer: 'Not in documents'
Always cite sources as [source:page].
Answer in English, in a concise and precise way.";

/// Timeout for the hosted chat API.
const OPENAI_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for the local chat API, which may be loading a model.
const OLLAMA_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("chat backend returned {status}: {message}")]
    Backend { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, LlmError>;

/// Chat-completion client for the configured backend.
pub struct LlmClient {
    client: reqwest::Client,
    provider: Provider,
    model: String,
    api_key: Option<String>,
    base_url: String,
}

/// Build the single prompt embedding the question and retrieved context.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "{SYSTEM_INSTRUCTION}\n\nQUESTION: {question}\nCONTEXT (relevant passages in PDF): {context}"
    )
}

impl LlmClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            provider: settings.provider,
            model: settings.llm_model.clone(),
            api_key: settings.openai_api_key.clone(),
            base_url: settings.ollama_base_url.clone(),
        })
    }

    /// Generate an answer for the question over the formatted context.
    pub async fn generate(&self, question: &str, context: &str) -> Result<String> {
        let prompt = build_prompt(question, context);
        match self.provider {
            Provider::OpenAi => self.chat_openai(&prompt).await,
            Provider::Ollama => self.chat_ollama(&prompt).await,
        }
    }

    async fn chat_openai(&self, prompt: &str) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": "You are a helpful assistant." },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.1,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(api_key)
            .timeout(OPENAI_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let reply: Value = response.json().await?;
        Ok(extract_message(&reply))
    }

    async fn chat_ollama(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        });

        let response = self
            .client
            .post(&url)
            .timeout(OLLAMA_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let reply: Value = response.json().await?;
        Ok(extract_message(&reply))
    }
}

async fn backend_error(response: reqwest::Response) -> LlmError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    LlmError::Backend { status, message }
}

/// Pull the assistant text out of whichever reply shape the backend used:
/// chat (`message.content`), chat completions (`choices[0].message.content`),
/// generate (`response`), or the raw reply stringified as a last resort.
fn extract_message(reply: &Value) -> String {
    if let Some(content) = reply
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
    {
        return content.to_string();
    }

    if let Some(content) = reply
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
    {
        return content.to_string();
    }

    if let Some(content) = reply.get("response").and_then(Value::as_str) {
        return content.to_string();
    }

    reply.to_string()
}
