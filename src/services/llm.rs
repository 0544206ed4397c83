//! LLM client for the chat agent
//!
//! Only Google Gemini is supported. The agent treats every error here as a
//! signal to fall back to its rule-based reply.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::AiConfig;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM response had no content")]
    EmptyResponse,

    #[error("Failed to parse LLM response: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A model that can continue a conversation
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, system: &str, history: &[ChatMessage]) -> Result<String, LlmError>;
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_output_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl GeminiClient {
    /// Returns `None` when no API key is configured
    pub fn from_config(config: &AiConfig, client: Client) -> Option<Self> {
        let api_key = config.gemini_api_key.as_deref()?.trim();
        if api_key.is_empty() {
            return None;
        }
        Some(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.to_string(),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_seconds.max(1)),
        })
    }

    fn build_request(&self, system: &str, history: &[ChatMessage]) -> (String, Value) {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint,
            self.model,
            urlencoding::encode(&self.api_key)
        );

        let contents: Vec<Value> = history
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| {
                let role = match m.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "model",
                };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect();

        let body = json!({
            "systemInstruction": {"parts": [{"text": system}]},
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": self.max_output_tokens,
                "temperature": self.temperature
            }
        });

        (url, body)
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

fn parse_response(text: &str) -> Result<String, LlmError> {
    let response: GeminiResponse =
        serde_json::from_str(text).map_err(|e| LlmError::Parse(e.to_string()))?;

    let reply: String = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    let reply = reply.trim();
    if reply.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(reply.to_string())
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn generate(&self, system: &str, history: &[ChatMessage]) -> Result<String, LlmError> {
        let (url, body) = self.build_request(system, history);
        tracing::debug!(model = %self.model, turns = history.len(), "Calling Gemini");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_response(&text)
    }
}
