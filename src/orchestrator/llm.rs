//! External-LLM port (spec §4.G step 6, §5): the orchestrator never talks
//! to a concrete HTTP client directly, only this narrow trait. The default
//! implementation is a `reqwest`-based chat-completion client with the
//! configurable deadline (§5, default 30s) enforced via `tokio::time::timeout`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{CoreError, ExternalError, Result};

#[async_trait]
pub trait ExternalLlmPort: Send + Sync {
    /// Sends `prompt` to the external LLM and returns its text response,
    /// failing with `ExternalError::LlmTimeout` if `deadline` elapses
    /// first (spec §5 cancellation/timeout semantics).
    async fn complete(&self, prompt: &str, deadline: Duration) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// `reqwest`-backed chat-completion client. Talks to any
/// OpenAI-compatible `POST {endpoint}` with a bearer token.
pub struct ReqwestLlmPort {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl ReqwestLlmPort {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        }
    }
}

#[async_trait]
impl ExternalLlmPort for ReqwestLlmPort {
    async fn complete(&self, prompt: &str, deadline: Duration) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let send = async {
            let response = request
                .send()
                .await
                .map_err(|e| CoreError::External(ExternalError::LlmRejected(e.to_string())))?;

            if !response.status().is_success() {
                return Err(CoreError::External(ExternalError::LlmRejected(format!(
                    "status {}",
                    response.status()
                ))));
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| CoreError::External(ExternalError::LlmRejected(e.to_string())))?;

            parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| CoreError::External(ExternalError::LlmRejected("empty choices".into())))
        };

        match tokio::time::timeout(deadline, send).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::External(ExternalError::LlmTimeout(deadline))),
        }
    }
}

/// Deterministic stub used in tests and as a safe no-network default when
/// no endpoint is configured; echoes a templated acknowledgement.
pub struct StubLlmPort;

#[async_trait]
impl ExternalLlmPort for StubLlmPort {
    async fn complete(&self, prompt: &str, _deadline: Duration) -> Result<String> {
        Ok(format!("[stub external response to: {prompt}]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_port_echoes_prompt() {
        let port = StubLlmPort;
        let out = port.complete("hello", Duration::from_secs(1)).await.unwrap();
        assert!(out.contains("hello"));
    }
}
