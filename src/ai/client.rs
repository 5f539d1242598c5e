//! Completion service client: integration with a local text-generation endpoint
//!
//! Defines the client trait for sending a prompt and getting free text back.
//! Two implementations:
//! - `OllamaClient`: POSTs to an Ollama-compatible `/api/generate` (production)
//! - `MockCompletionClient`: returns queued responses and records prompts (testing)

use crate::retry::Transient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Errors from completion client operations.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("completion request timed out: {0}")]
    Timeout(String),
    #[error("completion service unreachable: {0}")]
    Connection(String),
    #[error("completion service returned HTTP {0}")]
    Status(u16),
    #[error("completion response unreadable: {0}")]
    Decode(String),
    #[error("client setup failed: {0}")]
    Setup(String),
    #[error("request cancelled")]
    Cancelled,
}

impl Transient for AiError {
    /// Only timeouts and connection failures are worth another attempt.
    fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connection(_))
    }
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            Self::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Decode(e.to_string())
        }
    }
}

/// Client trait for the completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send a prompt, return the model's raw text answer.
    async fn generate(&self, prompt: &str) -> Result<String, AiError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// HTTP client for an Ollama-compatible generation endpoint.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Setup(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AiError::Status(status.as_u16()));
        }

        // The timeout also covers the body, so a stalled read stays retryable.
        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.response.trim().to_string())
    }
}

/// Mock client for testing. Returns queued responses in order.
///
/// Once the queue is empty, every call gets the fallback reply (or a
/// connection error when none is configured). Prompts containing a
/// registered marker always fail with a connection error.
#[derive(Default)]
pub struct MockCompletionClient {
    queued: Mutex<VecDeque<Result<String, AiError>>>,
    fallback: Option<String>,
    failing_markers: Vec<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletionClient {
    /// A client with nothing queued: every call fails to connect.
    pub fn new() -> Self {
        Self::default()
    }

    /// A client that answers every prompt with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(text.into()),
            ..Self::default()
        }
    }

    /// Queue a successful reply.
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(Ok(text.into()));
        }
        self
    }

    /// Queue a failure.
    pub fn with_error(self, error: AiError) -> Self {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(Err(error));
        }
        self
    }

    /// Fail every prompt that contains `marker`.
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.failing_markers.push(marker.into());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if self.failing_markers.iter().any(|m| prompt.contains(m.as_str())) {
            return Err(AiError::Connection("mock failure for marked prompt".to_string()));
        }

        let queued = self.queued.lock().ok().and_then(|mut q| q.pop_front());
        match queued {
            Some(reply) => reply,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| AiError::Connection("no mock response configured".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_replays_queue_then_fallback() {
        let client = MockCompletionClient::replying("fallback")
            .with_error(AiError::Timeout("slow".to_string()))
            .with_reply("first");

        assert!(matches!(
            client.generate("p").await.unwrap_err(),
            AiError::Timeout(_)
        ));
        assert_eq!(client.generate("p").await.unwrap(), "first");
        assert_eq!(client.generate("p").await.unwrap(), "fallback");
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn mock_without_replies_is_unreachable() {
        let client = MockCompletionClient::new();
        let err = client.generate("p").await.unwrap_err();
        assert!(matches!(err, AiError::Connection(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn mock_fails_marked_prompts() {
        let client = MockCompletionClient::replying("{}").failing_on("Marte");
        assert!(client.generate("Nacionalidad: Marte").await.is_err());
        assert!(client.generate("Nacionalidad: Chile").await.is_ok());
    }

    #[test]
    fn only_timeouts_and_connection_errors_are_transient() {
        assert!(AiError::Timeout(String::new()).is_transient());
        assert!(AiError::Connection(String::new()).is_transient());
        assert!(!AiError::Status(500).is_transient());
        assert!(!AiError::Decode(String::new()).is_transient());
        assert!(!AiError::Cancelled.is_transient());
    }
}
