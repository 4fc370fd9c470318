//! Shared test fixtures: a scripted LLM provider.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use presto::providers::base::{ChatProvider, ChatResponse, StreamChunk, StreamHandle, ToolCallRequest};

/// Scripted provider for driving sessions without a network.
///
/// `chat` (no tools) pops from `chat_replies` (the mode-switch classifier
/// path). `chat` (with tools) returns `tool_reply` (the background
/// visualization path. `chat_stream` pops scripted chunk sequences.
pub struct ScriptedProvider {
    pub chat_replies: Mutex<Vec<String>>,
    pub tool_reply: Mutex<Option<ChatResponse>>,
    pub stream_scripts: Mutex<Vec<Vec<StreamChunk>>>,
    pub stream_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            chat_replies: Mutex::new(Vec::new()),
            tool_reply: Mutex::new(None),
            stream_scripts: Mutex::new(Vec::new()),
            stream_calls: AtomicUsize::new(0),
        }
    }

    pub fn push_chat_reply(&self, reply: &str) {
        self.chat_replies.lock().unwrap().insert(0, reply.to_string());
    }

    pub fn set_tool_reply(&self, calls: Vec<(&str, &str)>) {
        *self.tool_reply.lock().unwrap() = Some(ChatResponse {
            content: None,
            tool_calls: calls
                .into_iter()
                .enumerate()
                .map(|(i, (name, args))| ToolCallRequest {
                    id: format!("call_{}", i),
                    name: name.to_string(),
                    arguments: args.to_string(),
                })
                .collect(),
            finish_reason: "tool_calls".to_string(),
        });
    }

    pub fn push_stream(&self, chunks: Vec<StreamChunk>) {
        self.stream_scripts.lock().unwrap().insert(0, chunks);
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn chat(&self, _messages: &[Value], tools: Option<&[Value]>) -> Result<ChatResponse> {
        if tools.is_some() {
            if let Some(reply) = self.tool_reply.lock().unwrap().clone() {
                return Ok(reply);
            }
        }
        let reply = self
            .chat_replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| r#"{"industry": null}"#.to_string());
        Ok(ChatResponse {
            content: Some(reply),
            tool_calls: Vec::new(),
            finish_reason: "stop".to_string(),
        })
    }

    async fn chat_stream(
        &self,
        _messages: &[Value],
        _tools: Option<&[Value]>,
    ) -> Result<StreamHandle> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let chunks = self.stream_scripts.lock().unwrap().pop().unwrap_or_else(|| {
            vec![
                StreamChunk::TextDelta("ok".to_string()),
                StreamChunk::Done {
                    finish_reason: "stop".to_string(),
                },
            ]
        });
        let (tx, rx) = mpsc::unbounded_channel();
        for chunk in chunks {
            let _ = tx.send(chunk);
        }
        Ok(StreamHandle { rx })
    }
}
