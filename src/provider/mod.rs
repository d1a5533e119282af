//! Backend provider contract and chat wire types.
//!
//! Providers are interchangeable: the orchestrator only ever holds
//! `Arc<dyn Provider>` values and drives failover across them in priority
//! order. One implementation ships in-tree, [`OpenAiCompatProvider`],
//! which covers any endpoint speaking the OpenAI chat-completions
//! protocol (OpenAI, DeepSeek, most proxies).

mod openai_compat;

pub use openai_compat::{OpenAiCompatProvider, ProviderConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message retained in conversation history.
///
/// Immutable once created; owned by the conversation window that holds it.
/// The token count is a caller-supplied estimate and is never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,
}

impl Message {
    /// Create a message without a token count.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tokens: None,
        }
    }

    /// Create a message carrying a caller-supplied token estimate.
    pub fn with_tokens(role: Role, content: impl Into<String>, tokens: u32) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tokens: Some(tokens),
        }
    }
}

/// The `{role, content}` projection actually transmitted to a backend.
///
/// Timestamps and token metadata never leave the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    /// Create a single user message, for calls that bypass the
    /// conversation window.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling and tool parameters for one completion call.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Tool definitions advertised to the model, when function calling is
    /// enabled for the request.
    pub tools: Option<Vec<ToolSpec>>,
}

impl GenerationParams {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 1000,
            temperature: 0.7,
            tools: None,
        }
    }
}

/// Tool definition advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Response from a completed chat call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub provider: String,
    pub tokens_used: u32,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

/// Lazy sequence of text fragments from a streaming call.
///
/// Finite and not restartable: it terminates normally at call completion
/// or fails mid-sequence with a [`ProviderError`].
pub type ChatStream = BoxStream<'static, Result<String, ProviderError>>;

/// Contract every backend must satisfy.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name used in stats and logs.
    fn name(&self) -> &str;

    /// Execute a chat completion.
    async fn chat(
        &self,
        messages: &[WireMessage],
        params: &GenerationParams,
    ) -> Result<ChatResponse, ProviderError>;

    /// Execute a streaming chat completion.
    ///
    /// The returned stream is consumed once; a mid-stream failure means
    /// the caller restarts from scratch on another provider.
    async fn stream(
        &self,
        messages: &[WireMessage],
        params: &GenerationParams,
    ) -> Result<ChatStream, ProviderError>;

    /// Cheap liveness probe. Must never fail: implementations suppress
    /// internal faults and report `false` instead.
    async fn is_available(&self) -> bool {
        true
    }
}
