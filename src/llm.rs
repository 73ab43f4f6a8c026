//! Text-generation collaborator: the capability that turns an instruction
//! plus schema context into candidate SQL.
//!
//! The pipeline only knows the [`TextGenerator`] trait. [`LlmClient`]
//! implements it over HTTP for the providers below; [`ScriptedGenerator`]
//! replays fixed candidates for validating hand-written SQL and for tests.
//!
//! # Supported Providers
//!
//! | Provider | Endpoint | Authentication |
//! |----------|----------|----------------|
//! | OpenAI | `api.openai.com` | Bearer token |
//! | Anthropic | `api.anthropic.com` | x-api-key header |
//! | Ollama | Local (configurable) | None |
//!
//! Failures are reported as [`GenerationError`] and are never retried here:
//! a transport failure ends the pipeline run.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use sql_lineage_guard::llm::{LlmClient, LlmProvider};
//!
//! let provider = LlmProvider::Ollama {
//!     base_url: "http://localhost:11434".into(),
//!     model:    "llama3.2".into()
//! };
//!
//! let client = LlmClient::with_timeout(provider, Duration::from_secs(30));
//! ```

mod prompt;
mod scripted;

use std::time::Duration;

use async_trait::async_trait;
pub use prompt::{build_prompt, extract_sql};
pub use scripted::ScriptedGenerator;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    ast::SqlDialect,
    catalog::SchemaSummary,
    error::{GenerationError, http_error},
    pipeline::PipelineAttempt
};

/// One request to the text generator.
///
/// `history` holds every earlier attempt of the run, so a repair request
/// can reference the previous candidates and their violations.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub instruction: String,
    pub dialect:     SqlDialect,
    pub schema:      SchemaSummary,
    /// Row cap the candidate must respect
    pub max_rows:    u64,
    pub history:     Vec<PipelineAttempt>
}

impl GenerationRequest {
    pub fn is_repair(&self) -> bool {
        !self.history.is_empty()
    }
}

/// SQL text returned by a generator, not yet validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateSql {
    pub sql: String
}

impl CandidateSql {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into()
        }
    }
}

/// Source of candidate SQL
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<CandidateSql, GenerationError>;
}

/// LLM provider configuration with authentication credentials.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// OpenAI API (GPT-4, GPT-3.5, etc.)
    OpenAI {
        /// API key (sk-...)
        api_key: String,
        /// Model identifier (e.g., "gpt-4", "gpt-3.5-turbo")
        model:   String
    },
    /// Anthropic API
    Anthropic {
        /// API key
        api_key: String,
        /// Model identifier (e.g., "claude-sonnet-4-20250514")
        model:   String
    },
    /// Local Ollama instance
    Ollama {
        /// Base URL (e.g., "http://localhost:11434")
        base_url: String,
        /// Model name (e.g., "llama3.2", "sqlcoder")
        model:    String
    }
}

impl LlmProvider {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAI {
                ..
            } => "openai",
            Self::Anthropic {
                ..
            } => "anthropic",
            Self::Ollama {
                ..
            } => "ollama"
        }
    }
}

/// HTTP client for LLM API communication.
///
/// Handles provider-specific request formatting and response parsing.
pub struct LlmClient {
    provider: LlmProvider,
    client:   reqwest::Client
}

#[derive(Serialize)]
struct OpenAIRequest {
    model:    String,
    messages: Vec<OpenAIRequestMessage>
}

#[derive(Serialize)]
struct OpenAIRequestMessage {
    role:    String,
    content: String
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: String
}

#[derive(Serialize)]
struct AnthropicRequest {
    model:      String,
    max_tokens: u32,
    messages:   Vec<AnthropicMessage>
}

#[derive(Serialize)]
struct AnthropicMessage {
    role:    String,
    content: String
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String
}

#[derive(Serialize)]
struct OllamaRequest {
    model:  String,
    prompt: String,
    stream: bool
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String
}

impl LlmClient {
    /// Create new LLM client with the default two-minute request timeout
    pub fn new(provider: LlmProvider) -> Self {
        Self::with_timeout(provider, Duration::from_secs(120))
    }

    /// Create new LLM client with a custom request timeout
    pub fn with_timeout(provider: LlmProvider, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            provider,
            client
        }
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    async fn call_provider(&self, prompt: &str) -> Result<String, GenerationError> {
        match &self.provider {
            LlmProvider::OpenAI {
                api_key,
                model
            } => self.call_openai(api_key, model, prompt).await,
            LlmProvider::Anthropic {
                api_key,
                model
            } => self.call_anthropic(api_key, model, prompt).await,
            LlmProvider::Ollama {
                base_url,
                model
            } => self.call_ollama(base_url, model, prompt).await
        }
    }

    async fn call_openai(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str
    ) -> Result<String, GenerationError> {
        let request = OpenAIRequest {
            model:    model.to_string(),
            messages: vec![OpenAIRequestMessage {
                role:    String::from("user"),
                content: prompt.to_string()
            }]
        };
        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(http_error)?;
        let response = check_status(response).await?;
        let result: OpenAIResponse = response.json().await.map_err(http_error)?;
        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(GenerationError::EmptyResponse)
    }

    async fn call_anthropic(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str
    ) -> Result<String, GenerationError> {
        let request = AnthropicRequest {
            model:      model.to_string(),
            max_tokens: 4096,
            messages:   vec![AnthropicMessage {
                role:    String::from("user"),
                content: prompt.to_string()
            }]
        };
        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(http_error)?;
        let response = check_status(response).await?;
        let result: AnthropicResponse = response.json().await.map_err(http_error)?;
        result
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or(GenerationError::EmptyResponse)
    }

    async fn call_ollama(
        &self,
        base_url: &str,
        model: &str,
        prompt: &str
    ) -> Result<String, GenerationError> {
        let request = OllamaRequest {
            model:  model.to_string(),
            prompt: prompt.to_string(),
            stream: false
        };
        let url = format!("{}/api/generate", base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(http_error)?;
        let response = check_status(response).await?;
        let result: OllamaResponse = response.json().await.map_err(http_error)?;
        Ok(result.response)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GenerationError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(GenerationError::Provider {
        status,
        body
    })
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<CandidateSql, GenerationError> {
        let prompt = build_prompt(request);
        info!(
            provider = self.provider.name(),
            repair = request.is_repair(),
            prompt_len = prompt.len(),
            "requesting SQL candidate"
        );
        let response = self.call_provider(&prompt).await?;
        let sql = extract_sql(&response).ok_or(GenerationError::EmptyResponse)?;
        debug!(sql = %sql, "candidate received");
        Ok(CandidateSql::new(sql))
    }
}
