//! OpenAI-compatible chat completions provider.
//!
//! Talks to any endpoint implementing the chat completions API format via
//! reqwest. Streaming responses are parsed from the SSE byte stream on a
//! spawned task; text and tool-call fragments are forwarded as they arrive.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::{debug, warn};

use super::base::{ChatProvider, ChatResponse, StreamChunk, StreamHandle, ToolCallRequest};
use crate::config::schema::LlmConfig;
use crate::errors::ProviderError;

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiCompatProvider {
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client: Client::new(),
        }
    }

    fn build_body(&self, messages: &[serde_json::Value], tools: Option<&[serde_json::Value]>, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        if let Some(tool_defs) = tools {
            if !tool_defs.is_empty() {
                body["tools"] = serde_json::Value::Array(tool_defs.to_vec());
                body["tool_choice"] = serde_json::json!("auto");
            }
        }
        body
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    async fn chat(
        &self,
        messages: &[serde_json::Value],
        tools: Option<&[serde_json::Value]>,
    ) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_body(messages, tools, false);

        debug!("chat: api_base={} model={}", self.api_base, self.model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| ProviderError::ResponseReadError(e.to_string()))?;

        if !status.is_success() {
            warn!(
                "LLM API returned status {} (base={}): {}",
                status, self.api_base, response_text
            );
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: response_text,
            }
            .into());
        }

        let data: serde_json::Value = serde_json::from_str(&response_text)
            .map_err(|e| ProviderError::JsonParseError(e.to_string()))?;

        parse_response(&data)
    }

    async fn chat_stream(
        &self,
        messages: &[serde_json::Value],
        tools: Option<&[serde_json::Value]>,
    ) -> Result<StreamHandle> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_body(messages, tools, true);

        debug!("chat_stream: api_base={} model={}", self.api_base, self.model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(
                "LLM streaming API returned status {} (base={}): {}",
                status, self.api_base, error_text
            );
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: error_text,
            }
            .into());
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let byte_stream = response.bytes_stream();
        tokio::spawn(async move {
            parse_sse_stream(byte_stream, tx).await;
        });

        Ok(StreamHandle { rx })
    }
}

/// Parse a buffered chat-completions JSON response.
fn parse_response(data: &serde_json::Value) -> Result<ChatResponse> {
    let choice = data
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .ok_or(ProviderError::EmptyResponse)?;

    let message = choice.get("message").cloned().unwrap_or_default();
    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .unwrap_or("stop")
        .to_string();

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let mut tool_calls = Vec::new();
    if let Some(tc_array) = message.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tc_array {
            let id = tc
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let function = tc.get("function").cloned().unwrap_or_default();
            let name = function
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let arguments = function
                .get("arguments")
                .and_then(|v| v.as_str())
                .unwrap_or("{}")
                .to_string();

            tool_calls.push(ToolCallRequest {
                id,
                name,
                arguments,
            });
        }
    }

    Ok(ChatResponse {
        content,
        tool_calls,
        finish_reason,
    })
}

/// Parse an SSE byte stream from a streaming chat-completions response.
///
/// Emits `TextDelta` for content deltas and `ToolCallDelta` for tool-call
/// fragments in arrival order, then a terminal `Done`.
async fn parse_sse_stream(
    byte_stream: impl futures_util::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
    tx: tokio::sync::mpsc::UnboundedSender<StreamChunk>,
) {
    let mut line_buffer = String::new();
    let mut finish_reason = String::from("stop");

    let mut stream = Box::pin(byte_stream);

    while let Some(result) = stream.next().await {
        let bytes = match result {
            Ok(b) => b,
            Err(e) => {
                warn!("SSE stream error: {}", e);
                break;
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        line_buffer.push_str(&text);

        while let Some(newline_pos) = line_buffer.find('\n') {
            let line = line_buffer[..newline_pos]
                .trim_end_matches('\r')
                .to_string();
            line_buffer = line_buffer[newline_pos + 1..].to_string();

            if line.is_empty() || !line.starts_with("data: ") {
                continue;
            }
            let data = &line[6..];

            if data == "[DONE]" {
                let _ = tx.send(StreamChunk::Done { finish_reason });
                return;
            }

            let chunk: serde_json::Value = match serde_json::from_str(data) {
                Ok(v) => v,
                Err(e) => {
                    debug!("SSE parse error (skipping chunk): {}", e);
                    continue;
                }
            };

            let Some(choice) = chunk
                .get("choices")
                .and_then(|c| c.as_array())
                .and_then(|arr| arr.first())
            else {
                continue;
            };

            if let Some(fr) = choice.get("finish_reason").and_then(|v| v.as_str()) {
                finish_reason = fr.to_string();
            }

            let Some(delta) = choice.get("delta") else {
                continue;
            };

            if let Some(content) = delta.get("content").and_then(|v| v.as_str()) {
                if !content.is_empty() {
                    let _ = tx.send(StreamChunk::TextDelta(content.to_string()));
                }
            }

            if let Some(tc_array) = delta.get("tool_calls").and_then(|v| v.as_array()) {
                for tc in tc_array {
                    let index = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
                    let id = tc
                        .get("id")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    let function = tc.get("function");
                    let name = function
                        .and_then(|f| f.get("name"))
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    let arguments = function
                        .and_then(|f| f.get("arguments"))
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();

                    let _ = tx.send(StreamChunk::ToolCallDelta {
                        index,
                        id,
                        name,
                        arguments,
                    });
                }
            }
        }
    }

    // Stream ended without [DONE].
    let _ = tx.send(StreamChunk::Done { finish_reason });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::base::ToolCallAccumulator;

    // -- parse_response tests --

    #[test]
    fn test_parse_response_with_content_and_tool_calls() {
        let data = serde_json::json!({
            "choices": [{
                "message": {
                    "content": "Sure, here's the chart.",
                    "tool_calls": [{
                        "id": "call_abc123",
                        "type": "function",
                        "function": {
                            "name": "show_chart",
                            "arguments": "{\"chart_type\": \"line\", \"title\": \"t\", \"data\": []}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });

        let resp = parse_response(&data).expect("parse should succeed");
        assert_eq!(resp.content.as_deref(), Some("Sure, here's the chart."));
        assert_eq!(resp.finish_reason, "tool_calls");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].id, "call_abc123");
        assert_eq!(resp.tool_calls[0].name, "show_chart");
        assert!(resp.tool_calls[0].arguments.contains("chart_type"));
    }

    #[test]
    fn test_parse_response_content_only() {
        let data = serde_json::json!({
            "choices": [{
                "message": {"content": "Hello!"},
                "finish_reason": "stop"
            }]
        });

        let resp = parse_response(&data).expect("parse should succeed");
        assert_eq!(resp.content.as_deref(), Some("Hello!"));
        assert!(resp.tool_calls.is_empty());
    }

    #[test]
    fn test_parse_response_empty_choices_is_error() {
        let data = serde_json::json!({"choices": []});
        let err = parse_response(&data).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::EmptyResponse)
        ));
    }

    #[test]
    fn test_parse_response_empty_content_is_none() {
        let data = serde_json::json!({
            "choices": [{
                "message": {"content": ""},
                "finish_reason": "stop"
            }]
        });
        let resp = parse_response(&data).expect("parse should succeed");
        assert!(resp.content.is_none());
    }

    // -- SSE stream tests --

    fn sse_bytes(lines: &[&str]) -> Vec<Result<bytes::Bytes, reqwest::Error>> {
        lines
            .iter()
            .map(|l| Ok(bytes::Bytes::from(format!("{}\n", l))))
            .collect()
    }

    async fn collect_chunks(lines: &[&str]) -> Vec<StreamChunk> {
        let stream = futures_util::stream::iter(sse_bytes(lines));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        parse_sse_stream(Box::pin(stream), tx).await;

        let mut chunks = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn test_sse_text_deltas_in_order() {
        let chunks = collect_chunks(&[
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            "data: [DONE]",
        ])
        .await;

        let texts: Vec<String> = chunks
            .iter()
            .filter_map(|c| match c {
                StreamChunk::TextDelta(t) => Some(t.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Hel", "lo"]);
        assert!(matches!(
            chunks.last(),
            Some(StreamChunk::Done { finish_reason }) if finish_reason == "stop"
        ));
    }

    #[tokio::test]
    async fn test_sse_tool_call_fragments_reassemble() {
        let chunks = collect_chunks(&[
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"show_chart","arguments":"{\"chart_"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"type\": \"bar\"}"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            "data: [DONE]",
        ])
        .await;

        let mut acc = ToolCallAccumulator::new();
        for chunk in &chunks {
            if let StreamChunk::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } = chunk
            {
                acc.ingest(*index, id.as_deref(), name.as_deref(), arguments);
            }
        }
        let calls = acc.into_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "show_chart");
        assert_eq!(calls[0].arguments, r#"{"chart_type": "bar"}"#);
    }

    #[tokio::test]
    async fn test_sse_without_done_still_terminates() {
        let chunks = collect_chunks(&[
            r#"data: {"choices":[{"delta":{"content":"partial"}}]}"#,
        ])
        .await;
        assert!(matches!(chunks.last(), Some(StreamChunk::Done { .. })));
    }

    #[tokio::test]
    async fn test_sse_skips_malformed_chunks() {
        let chunks = collect_chunks(&[
            "data: {broken json",
            r#"data: {"choices":[{"delta":{"content":"ok"}}]}"#,
            "data: [DONE]",
        ])
        .await;
        let texts: Vec<&str> = chunks
            .iter()
            .filter_map(|c| match c {
                StreamChunk::TextDelta(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["ok"]);
    }
}
