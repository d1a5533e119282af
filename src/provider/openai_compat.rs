//! OpenAI-compatible chat-completions adapter.
//!
//! One configured instance per vendor endpoint. Anything speaking the
//! OpenAI protocol works: OpenAI itself, DeepSeek, or a local proxy.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    ChatResponse, ChatStream, GenerationParams, Provider, ToolCallRequest, ToolSpec, WireMessage,
};
use crate::error::ProviderError;

/// Connection settings for one OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Name reported in stats and logs, e.g. `"deepseek"`.
    pub name: String,
    pub api_key: String,
    /// Base URL without a trailing slash, e.g. `https://api.deepseek.com/v1`.
    pub base_url: String,
    /// Per-call timeout enforced by the HTTP client.
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP client for one OpenAI-compatible vendor.
pub struct OpenAiCompatProvider {
    config: ProviderConfig,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { config, client }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn build_request(
        &self,
        messages: &[WireMessage],
        params: &GenerationParams,
        stream: bool,
    ) -> ApiRequest {
        ApiRequest {
            model: params.model.clone(),
            messages: messages.to_vec(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream,
            tools: params
                .tools
                .as_ref()
                .map(|specs| specs.iter().map(ApiTool::from_spec).collect()),
            tool_choice: params.tools.as_ref().map(|_| "auto".to_string()),
        }
    }

    fn map_send_error(e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(e.to_string())
        } else {
            ProviderError::Network(e.to_string())
        }
    }

    fn map_status_error(status: reqwest::StatusCode, body: String) -> ProviderError {
        if status.as_u16() == 429 {
            ProviderError::RateLimited(body)
        } else {
            ProviderError::Api {
                status: status.as_u16(),
                message: body,
            }
        }
    }

    async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status_error(status, body));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn chat(
        &self,
        messages: &[WireMessage],
        params: &GenerationParams,
    ) -> Result<ChatResponse, ProviderError> {
        let request = self.build_request(messages, params, false);
        tracing::debug!("sending chat request to {}: model={}", self.config.name, params.model);

        let response = self.send(&request).await?;
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        parse_chat_response(&body, &params.model, &self.config.name)
    }

    async fn stream(
        &self,
        messages: &[WireMessage],
        params: &GenerationParams,
    ) -> Result<ChatStream, ProviderError> {
        let request = self.build_request(messages, params, true);
        tracing::debug!("opening chat stream to {}: model={}", self.config.name, params.model);

        let response = self.send(&request).await?;
        let mut bytes = response.bytes_stream();

        let stream = try_stream! {
            let mut buffer = String::new();
            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| ProviderError::Stream(e.to_string()))?;
                if let Ok(text) = std::str::from_utf8(&chunk) {
                    buffer.push_str(text);

                    // Process complete SSE events (terminated by a blank line).
                    while let Some(pos) = buffer.find("\n\n") {
                        let event = buffer[..pos].to_string();
                        buffer.drain(..pos + 2);

                        for line in event.lines() {
                            let Some(data) = line.strip_prefix("data:") else {
                                continue;
                            };
                            let data = data.trim();
                            if data == "[DONE]" {
                                break 'outer;
                            }
                            if let Some(fragment) = extract_fragment(data) {
                                yield fragment;
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.config.base_url);
        match self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("availability probe for {} failed: {}", self.config.name, e);
                false
            }
        }
    }
}

/// Parse a non-streaming completion body into a [`ChatResponse`].
fn parse_chat_response(
    body: &str,
    model: &str,
    provider: &str,
) -> Result<ChatResponse, ProviderError> {
    let parsed: ApiResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Parse(format!("{e}, body: {body}")))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Parse("no choices in response".to_string()))?;

    let tool_calls = choice.message.tool_calls.map(|calls| {
        calls
            .into_iter()
            .map(|c| ToolCallRequest {
                name: c.function.name,
                arguments: decode_arguments(&c.function.arguments),
            })
            .collect()
    });

    Ok(ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        model: parsed.model.unwrap_or_else(|| model.to_string()),
        provider: provider.to_string(),
        tokens_used: parsed.usage.map_or(0, |u| u.total_tokens),
        cached: false,
        tool_calls,
    })
}

/// Extract the text delta from one SSE data payload, if any.
fn extract_fragment(data: &str) -> Option<String> {
    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
    let fragment = chunk.choices.into_iter().next()?.delta.content?;
    if fragment.is_empty() {
        None
    } else {
        Some(fragment)
    }
}

/// Tool arguments arrive as a JSON-encoded string; fall back to the raw
/// text when a model emits something that is not valid JSON.
fn decode_arguments(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f64,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiFunction,
}

impl ApiTool {
    fn from_spec(spec: &ToolSpec) -> Self {
        Self {
            tool_type: "function",
            function: ApiFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    function: ApiFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{
            "model": "deepseek-chat",
            "choices": [{"message": {"content": "hi there"}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
        }"#;
        let response = parse_chat_response(body, "fallback-model", "deepseek").unwrap();
        assert_eq!(response.content, "hi there");
        assert_eq!(response.model, "deepseek-chat");
        assert_eq!(response.provider, "deepseek");
        assert_eq!(response.tokens_used, 8);
        assert!(!response.cached);
        assert!(response.tool_calls.is_none());
    }

    #[test]
    fn test_parse_chat_response_tool_calls() {
        let body = r#"{
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{"function": {"name": "get_time", "arguments": "{\"tz\": \"UTC\"}"}}]
            }}]
        }"#;
        let response = parse_chat_response(body, "deepseek-chat", "deepseek").unwrap();
        assert_eq!(response.content, "");
        assert_eq!(response.model, "deepseek-chat");
        let calls = response.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_time");
        assert_eq!(calls[0].arguments["tz"], "UTC");
    }

    #[test]
    fn test_parse_chat_response_no_choices() {
        let err = parse_chat_response(r#"{"choices": []}"#, "m", "p").unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[test]
    fn test_extract_fragment() {
        let data = r#"{"choices": [{"delta": {"content": "Hel"}}]}"#;
        assert_eq!(extract_fragment(data), Some("Hel".to_string()));

        // Role-only deltas and empty fragments carry no text.
        assert_eq!(extract_fragment(r#"{"choices": [{"delta": {}}]}"#), None);
        assert_eq!(
            extract_fragment(r#"{"choices": [{"delta": {"content": ""}}]}"#),
            None
        );
        assert_eq!(extract_fragment("not json"), None);
    }

    #[test]
    fn test_decode_arguments_falls_back_to_raw_text() {
        assert_eq!(decode_arguments(r#"{"a": 1}"#)["a"], 1);
        assert_eq!(
            decode_arguments("broken{"),
            serde_json::Value::String("broken{".to_string())
        );
    }
}
