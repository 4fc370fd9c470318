//! Text-channel chat session.
//!
//! One `handle_message` call per user turn: mode-switch short-circuit,
//! response-cache replay, or a streamed LLM round with tool execution. All
//! client output goes through the [`ChatEvent`] envelope channel; the server
//! serializes whatever arrives there.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use crate::cache::CachedResponse;
use crate::context::AppContext;
use crate::history::Role;
use crate::prompt::build_system_prompt;
use crate::providers::base::{ChatProvider, StreamChunk, ToolCallAccumulator};
use crate::switch::SwitchSignals;
use crate::tools::{chat_tool_definitions, execute_tool, recover_tool_calls};

/// Outbound text-channel envelope: `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChatEvent {
    ChatStart {},
    ChatChunk { text: String, done: bool },
    ToolResult { tool: String, result: Value },
    ChatError { error: String },
    ModeSwitch { mode: Value, persona: Value },
    ModeGenerating { industry: String },
    ModeGeneratingCancel {},
}

struct ChatSignals {
    tx: UnboundedSender<ChatEvent>,
}

#[async_trait]
impl SwitchSignals for ChatSignals {
    async fn generating(&self, industry: &str) {
        let _ = self.tx.send(ChatEvent::ModeGenerating {
            industry: industry.to_string(),
        });
    }

    async fn cancel_generating(&self) {
        let _ = self.tx.send(ChatEvent::ModeGeneratingCancel {});
    }
}

/// Orchestrates one request/response turn over the chat-completions client.
pub struct ChatSession {
    ctx: Arc<AppContext>,
    tx: UnboundedSender<ChatEvent>,
}

impl ChatSession {
    pub fn new(ctx: Arc<AppContext>, tx: UnboundedSender<ChatEvent>) -> Self {
        Self { ctx, tx }
    }

    fn send(&self, event: ChatEvent) {
        let _ = self.tx.send(event);
    }

    /// Handle one user chat message.
    pub async fn handle_message(&self, text: &str) -> Result<()> {
        info!("Handling chat message ({} chars)", text.len());

        // 1. Mode switch?
        let signals = ChatSignals {
            tx: self.tx.clone(),
        };
        if let Some(new_mode) = self.ctx.detector.detect(text, &signals).await {
            self.switch_mode(new_mode);
            return Ok(());
        }

        self.send(ChatEvent::ChatStart {});

        let current_mode = self.ctx.store.get_current();

        // 2. Cache replay?
        let cached = {
            let mut cache = self.ctx.cache.lock().unwrap();
            cache.get(&current_mode.id, text)
        };
        if let Some(cached) = cached {
            info!("Response cache hit for mode {}", current_mode.id);
            self.replay_cached(text, cached);
            return Ok(());
        }

        // 3. Full LLM round.
        let persona = self.ctx.ensure_persona(&current_mode.id);
        let system_prompt = build_system_prompt(&current_mode, &persona);

        let messages = {
            let mut history = self.ctx.history.lock().unwrap();
            history.push(Role::User, text);
            let mut messages =
                vec![serde_json::json!({"role": "system", "content": system_prompt})];
            messages.extend(history.to_messages());
            messages
        };

        let tools = chat_tool_definitions();
        let mut handle = match self.ctx.provider.chat_stream(&messages, Some(&tools)).await {
            Ok(handle) => handle,
            Err(e) => {
                error!("LLM call failed: {}", e);
                self.send(ChatEvent::ChatError {
                    error: e.to_string(),
                });
                return Ok(());
            }
        };

        // 4. Forward deltas as they arrive; accumulate tool-call fragments
        // per stream index.
        let mut full_response = String::new();
        let mut accumulator = ToolCallAccumulator::new();
        while let Some(chunk) = handle.rx.recv().await {
            match chunk {
                StreamChunk::TextDelta(delta) => {
                    full_response.push_str(&delta);
                    self.send(ChatEvent::ChatChunk {
                        text: delta,
                        done: false,
                    });
                }
                StreamChunk::ToolCallDelta {
                    index,
                    id,
                    name,
                    arguments,
                } => {
                    accumulator.ingest(index, id.as_deref(), name.as_deref(), &arguments);
                }
                StreamChunk::Done { .. } => break,
            }
        }

        // 5. Record the assistant turn and execute completed tool calls.
        if !full_response.is_empty() {
            self.ctx
                .history
                .lock()
                .unwrap()
                .push(Role::Assistant, full_response.clone());
        }

        let mut tool_results: Vec<(String, Value)> = Vec::new();
        for call in accumulator.into_calls() {
            if call.name.is_empty() && call.arguments.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&call.arguments) {
                Ok(arguments) => {
                    info!("Executing tool: {}", call.name);
                    let result = execute_tool(&call.name, &arguments);
                    self.send(ChatEvent::ToolResult {
                        tool: call.name.clone(),
                        result: result.clone(),
                    });
                    tool_results.push((call.name, result));
                }
                Err(parse_err) => {
                    // Recovery path: the argument text may be several JSON
                    // objects concatenated without a separator.
                    let recovered = recover_tool_calls(&call.arguments, &call.name);
                    if recovered.is_empty() {
                        warn!(
                            "Dropping unparseable tool call {} ({}): {}",
                            call.name,
                            parse_err,
                            &call.arguments.chars().take(120).collect::<String>()
                        );
                        continue;
                    }
                    info!(
                        "Recovered {} tool call(s) from concatenated arguments",
                        recovered.len()
                    );
                    for rec in recovered {
                        let result = execute_tool(&rec.name, &rec.arguments);
                        self.send(ChatEvent::ToolResult {
                            tool: rec.name.clone(),
                            result: result.clone(),
                        });
                        tool_results.push((rec.name, result));
                    }
                }
            }
        }

        // 6. Cache for replay.
        {
            let mut cache = self.ctx.cache.lock().unwrap();
            cache.put(
                &current_mode.id,
                text,
                CachedResponse {
                    response_text: full_response.clone(),
                    tool_results,
                },
            );
        }

        // 7. Terminal chunk.
        self.send(ChatEvent::ChatChunk {
            text: String::new(),
            done: true,
        });

        info!("Chat response completed ({} chars)", full_response.len());
        Ok(())
    }

    /// Activate a new mode and emit the switch payload plus a synthesized
    /// welcome as a simulated streamed response. No LLM call happens.
    fn switch_mode(&self, new_mode: crate::modes::Mode) {
        info!("Mode switched to: {}", new_mode.name);

        self.ctx.store.activate(new_mode.clone());
        self.ctx.history.lock().unwrap().clear();
        let persona = self.ctx.regenerate_persona(&new_mode.id);

        self.send(ChatEvent::ModeSwitch {
            mode: new_mode.client_payload(),
            persona: Value::Object(persona),
        });

        self.send(ChatEvent::ChatStart {});
        self.send(ChatEvent::ChatChunk {
            text: format!(
                "Presto-Change-O! I'm now your {} assistant. How can I help you today?",
                new_mode.name
            ),
            done: false,
        });
        self.send(ChatEvent::ChatChunk {
            text: String::new(),
            done: true,
        });
    }

    /// Replay a cached response verbatim.
    fn replay_cached(&self, text: &str, cached: CachedResponse) {
        {
            let mut history = self.ctx.history.lock().unwrap();
            history.push(Role::User, text);
            if !cached.response_text.is_empty() {
                history.push(Role::Assistant, cached.response_text.clone());
            }
        }

        if !cached.response_text.is_empty() {
            self.send(ChatEvent::ChatChunk {
                text: cached.response_text,
                done: false,
            });
        }
        for (tool, result) in cached.tool_results {
            self.send(ChatEvent::ToolResult { tool, result });
        }
        self.send(ChatEvent::ChatChunk {
            text: String::new(),
            done: true,
        });
    }
}
