//! Base LLM provider interface.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool call request from the LLM.
///
/// `arguments` is kept as the raw JSON text the model produced; parsing (and
/// the concatenated-object recovery path) happens at the call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Response from a buffered chat completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish_reason: String,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A chunk from a streaming chat completion.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// Incremental text content.
    TextDelta(String),
    /// Incremental tool-call fragment, tagged with its stream index.
    ///
    /// A single call's name and argument text may arrive across many chunks;
    /// consumers concatenate fragments per index in arrival order.
    ToolCallDelta {
        index: u64,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    /// Stream complete.
    Done { finish_reason: String },
}

/// Handle to a streaming LLM response.
pub struct StreamHandle {
    pub rx: tokio::sync::mpsc::UnboundedReceiver<StreamChunk>,
}

/// Abstract trait for chat-completion providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a buffered chat completion request.
    ///
    /// `messages` are role-tagged chat messages; `tools` optional definitions
    /// in chat-completions format.
    async fn chat(&self, messages: &[Value], tools: Option<&[Value]>) -> Result<ChatResponse>;

    /// Send a streaming chat completion request.
    ///
    /// Default implementation falls back to buffered `chat()` and replays it
    /// as a short chunk sequence.
    async fn chat_stream(
        &self,
        messages: &[Value],
        tools: Option<&[Value]>,
    ) -> Result<StreamHandle> {
        let response = self.chat(messages, tools).await?;
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        if let Some(ref content) = response.content {
            let _ = tx.send(StreamChunk::TextDelta(content.clone()));
        }
        for (index, call) in response.tool_calls.iter().enumerate() {
            let _ = tx.send(StreamChunk::ToolCallDelta {
                index: index as u64,
                id: Some(call.id.clone()),
                name: Some(call.name.clone()),
                arguments: call.arguments.clone(),
            });
        }
        let _ = tx.send(StreamChunk::Done {
            finish_reason: response.finish_reason,
        });
        Ok(StreamHandle { rx })
    }
}

// ---------------------------------------------------------------------------
// Tool-call fragment accumulation
// ---------------------------------------------------------------------------

/// A tool call assembled from streamed fragments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulatedCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Accumulates [`StreamChunk::ToolCallDelta`] fragments keyed by stream
/// index. Fragments for one index are concatenated in arrival order, so the
/// assembled argument text reproduces the original byte-for-byte.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u64, AccumulatedCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one fragment.
    pub fn ingest(&mut self, index: u64, id: Option<&str>, name: Option<&str>, arguments: &str) {
        let entry = self.calls.entry(index).or_default();
        if let Some(id) = id {
            if !id.is_empty() {
                entry.id = id.to_string();
            }
        }
        if let Some(name) = name {
            if !name.is_empty() {
                entry.name = name.to_string();
            }
        }
        entry.arguments.push_str(arguments);
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Drain accumulated calls in index order.
    pub fn into_calls(self) -> Vec<AccumulatedCall> {
        self.calls.into_values().collect()
    }
}
