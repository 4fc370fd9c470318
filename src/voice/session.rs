//! Realtime voice session: the bidirectional relay state machine.
//!
//! One session per voice connection. Two loops run for the lifetime of the
//! relay: client frames into the model's audio buffer, model events back out
//! to the client. The loops are raced against each other, with background visualization
//! tasks fanned out per tool call and reconciled through the deferred
//! notification gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::context::AppContext;
use crate::history::{ConversationHistory, Role};
use crate::modes::Mode;
use crate::prompt::{build_system_prompt, build_voice_prompt};
use crate::providers::realtime::{self, RealtimeEvent, RealtimePort};
use crate::switch::{contains_wake_word, SwitchSignals};
use crate::tools::{execute_tool, realtime_tool_definitions, TOOL_REQUEST_VISUALIZATION};
use crate::voice::frames::{ClientFrame, ServerFrame};
use crate::voice::visualization::{
    inject_notification, run_visualization_task, NotificationGate, PendingVisualizations, VisKind,
    VisualizationJob,
};

/// Relay lifecycle. Terminal: `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Connecting,
    Active,
    Closing,
    Closed,
}

struct VoiceSignals {
    tx: UnboundedSender<ServerFrame>,
}

#[async_trait]
impl SwitchSignals for VoiceSignals {
    async fn generating(&self, industry: &str) {
        // The generic indicator is already up by the time the detector runs
        // (wake-word preemption); only generation-start is news.
        if !industry.is_empty() {
            let _ = self.tx.send(ServerFrame::ModeGenerating {
                payload: json!({"industry": industry}),
            });
        }
    }

    async fn cancel_generating(&self) {
        let _ = self.tx.send(ServerFrame::ModeGeneratingCancel { payload: json!({}) });
    }
}

/// A realtime voice relay session.
pub struct VoiceSession {
    ctx: Arc<AppContext>,
}

impl VoiceSession {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Run the relay until the client stops, either socket dies, or a loop
    /// fails. Always tears down: cancels background tasks, closes the
    /// upstream socket, and best-effort notifies the client.
    pub async fn run(
        &self,
        client_rx: UnboundedReceiver<ClientFrame>,
        client_tx: UnboundedSender<ServerFrame>,
    ) -> Result<()> {
        let mut state = SessionState::Idle;
        debug!("Voice session starting (state={:?})", state);

        state = SessionState::Connecting;
        debug!("Voice session connecting (state={:?})", state);
        let url = self
            .ctx
            .config
            .realtime
            .resolve_url(&self.ctx.config.llm.api_base);
        let (sender, mut receiver) =
            match realtime::connect(&url, &self.ctx.config.llm.api_key).await {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Failed to connect to realtime service: {}", e);
                    let _ = client_tx.send(ServerFrame::Error {
                        error: format!("Failed to connect to voice service: {}", e),
                    });
                    let _ = client_tx.send(ServerFrame::disconnected());
                    return Err(e);
                }
            };
        let upstream: Arc<dyn RealtimePort> = Arc::new(sender.clone());

        // Entering ACTIVE: push session configuration, then ack the client.
        let current_mode = self.ctx.store.get_current();
        let persona = self.ctx.ensure_persona(&current_mode.id);
        let instructions = build_voice_prompt(&build_system_prompt(&current_mode, &persona));
        if let Err(e) = upstream
            .update_session(self.session_config(&instructions))
            .await
        {
            error!("Failed to configure realtime session: {}", e);
            let _ = client_tx.send(ServerFrame::Error {
                error: e.to_string(),
            });
            sender.close().await;
            let _ = client_tx.send(ServerFrame::disconnected());
            return Err(e);
        }
        let _ = client_tx.send(ServerFrame::connected());
        state = SessionState::Active;
        info!(
            "Voice session active (state={:?}, mode={})",
            state, current_mode.id
        );

        let muted = Arc::new(AtomicBool::new(false));
        let gate = Arc::new(Mutex::new(NotificationGate::new()));
        let pending = Arc::new(Mutex::new(PendingVisualizations::new()));

        let mut model_loop = ModelLoop {
            ctx: self.ctx.clone(),
            upstream: upstream.clone(),
            client_tx: client_tx.clone(),
            gate: gate.clone(),
            pending: pending.clone(),
            transcript: ConversationHistory::new(self.ctx.config.chat.history_cap),
        };

        // Race the two relay loops; whichever exits first (success or error)
        // cancels the other by drop.
        let result = tokio::select! {
            res = client_loop(client_rx, upstream.clone(), muted.clone()) => {
                debug!("Client loop finished first: {:?}", res.as_ref().err());
                res
            }
            res = async {
                while let Some(event) = receiver.next_event().await {
                    model_loop.handle_event(event?).await?;
                }
                Ok::<(), anyhow::Error>(())
            } => {
                debug!("Model loop finished first: {:?}", res.as_ref().err());
                res
            }
        };

        state = SessionState::Closing;
        debug!("Voice session closing (state={:?})", state);

        if let Err(e) = &result {
            let _ = client_tx.send(ServerFrame::Error {
                error: e.to_string(),
            });
        }

        pending.lock().unwrap().cancel_all();
        sender.close().await;
        let _ = client_tx.send(ServerFrame::disconnected());

        state = SessionState::Closed;
        info!("Voice session ended (state={:?})", state);
        result
    }

    /// Build the realtime session configuration object.
    fn session_config(&self, instructions: &str) -> Value {
        let rt = &self.ctx.config.realtime;
        json!({
            "modalities": ["text", "audio"],
            "voice": rt.voice,
            "input_audio_format": "pcm16",
            "output_audio_format": "pcm16",
            "input_audio_transcription": {"model": rt.transcription_model},
            "turn_detection": {
                "type": "server_vad",
                "threshold": rt.vad_threshold,
                "prefix_padding_ms": rt.prefix_padding_ms,
                "silence_duration_ms": rt.silence_duration_ms,
            },
            "tools": realtime_tool_definitions(),
            "instructions": instructions,
        })
    }
}

/// Client→model loop: forwards audio frames into the model's input buffer
/// (honoring the mute flag), exits on a stop frame or client disconnect.
async fn client_loop(
    mut client_rx: UnboundedReceiver<ClientFrame>,
    upstream: Arc<dyn RealtimePort>,
    muted: Arc<AtomicBool>,
) -> Result<()> {
    while let Some(frame) = client_rx.recv().await {
        match frame {
            ClientFrame::Audio { data } => {
                if !muted.load(Ordering::SeqCst) {
                    upstream.append_audio(&data).await?;
                }
            }
            ClientFrame::Mute { muted: flag } => {
                muted.store(flag, Ordering::SeqCst);
                info!("Mute state changed: {}", flag);
            }
            ClientFrame::Stop => {
                info!("Stop requested by client");
                return Ok(());
            }
        }
    }
    info!("Client channel closed");
    Ok(())
}

/// Model→client loop state: reacts to each realtime event.
struct ModelLoop {
    ctx: Arc<AppContext>,
    upstream: Arc<dyn RealtimePort>,
    client_tx: UnboundedSender<ServerFrame>,
    gate: Arc<Mutex<NotificationGate>>,
    pending: Arc<Mutex<PendingVisualizations>>,
    transcript: ConversationHistory,
}

impl ModelLoop {
    fn send(&self, frame: ServerFrame) {
        let _ = self.client_tx.send(frame);
    }

    async fn handle_event(&mut self, event: RealtimeEvent) -> Result<()> {
        match event {
            RealtimeEvent::SessionCreated => {
                info!("Realtime session created");
            }
            RealtimeEvent::SessionUpdated => {
                debug!("Realtime session updated");
            }
            RealtimeEvent::SpeechStarted => {
                // Barge-in: cancel the in-progress response before anything
                // else, then tell the client.
                self.upstream.cancel_response().await?;
                self.send(ServerFrame::SpeechStarted);
            }
            RealtimeEvent::SpeechStopped => {
                self.send(ServerFrame::SpeechStopped);
            }
            RealtimeEvent::InputTranscriptCompleted { transcript } => {
                self.handle_user_transcript(transcript).await?;
            }
            RealtimeEvent::ResponseCreated => {
                self.gate.lock().unwrap().response_started();
            }
            RealtimeEvent::ResponseDone => {
                let queued = self.gate.lock().unwrap().response_done();
                for notification in queued {
                    inject_notification(self.upstream.as_ref(), &notification).await?;
                }
            }
            RealtimeEvent::AudioDelta { delta } => {
                self.send(ServerFrame::Audio { data: delta });
            }
            RealtimeEvent::TranscriptDelta { delta } => {
                self.transcript.append_assistant_delta(&delta);
                self.send(ServerFrame::Transcript {
                    role: "assistant".to_string(),
                    text: delta,
                });
            }
            RealtimeEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => {
                self.handle_function_call(call_id, name, arguments).await?;
            }
            RealtimeEvent::ErrorEvent { message } => {
                warn!("Realtime error event: {}", message);
                self.send(ServerFrame::Error { error: message });
            }
            RealtimeEvent::Other(kind) => {
                debug!("Ignoring realtime event: {}", kind);
            }
        }
        Ok(())
    }

    /// A finished user utterance: record it, forward it, and check for a
    /// mode switch.
    async fn handle_user_transcript(&mut self, transcript: String) -> Result<()> {
        if transcript.is_empty() {
            return Ok(());
        }

        self.transcript.push(Role::User, transcript.clone());
        self.send(ServerFrame::Transcript {
            role: "user".to_string(),
            text: transcript.clone(),
        });

        if !contains_wake_word(&transcript) {
            return Ok(());
        }

        // Preemptive cancellation before the (slow) semantic check: kill the
        // in-flight response and all pending background work, then show the
        // generic loading indicator.
        self.upstream.cancel_response().await?;
        info!("Cancelled in-flight response (possible mode switch)");
        self.pending.lock().unwrap().cancel_all();
        self.send(ServerFrame::ModeGenerating {
            payload: json!({"industry": ""}),
        });

        let signals = VoiceSignals {
            tx: self.client_tx.clone(),
        };
        match self.ctx.detector.detect(&transcript, &signals).await {
            Some(new_mode) => self.switch_mode(new_mode).await?,
            None => {
                // Wake word fired but nothing came of it; detector signalled
                // cancel-loading already.
                debug!("Wake word without a resulting switch");
            }
        }
        Ok(())
    }

    /// Apply a mode switch mid-session: client payload, refreshed model
    /// instructions, and an authored greet turn.
    async fn switch_mode(&mut self, new_mode: Mode) -> Result<()> {
        info!("Voice mode switch: {}", new_mode.name);

        self.pending.lock().unwrap().cancel_all();
        self.ctx.store.activate(new_mode.clone());
        self.transcript.clear();
        let persona = self.ctx.regenerate_persona(&new_mode.id);

        self.send(ServerFrame::ModeSwitch {
            payload: json!({
                "mode": new_mode.client_payload(),
                "persona": Value::Object(persona.clone()),
            }),
        });

        let instructions = build_voice_prompt(&build_system_prompt(&new_mode, &persona));
        self.upstream
            .update_session(json!({
                "tools": realtime_tool_definitions(),
                "instructions": instructions,
            }))
            .await?;

        self.upstream
            .create_user_text_item(&format!(
                "The user just switched to {} mode. Greet them warmly as their new {} assistant. Be brief.",
                new_mode.name, new_mode.name
            ))
            .await?;
        self.upstream.create_response().await?;
        Ok(())
    }

    /// A completed tool call from the realtime model.
    async fn handle_function_call(
        &mut self,
        call_id: String,
        name: String,
        arguments: String,
    ) -> Result<()> {
        info!("Voice tool call: {}", name);
        let args: Value = serde_json::from_str(&arguments).unwrap_or_else(|e| {
            warn!("Malformed voice tool arguments ({}), using empty object", e);
            json!({})
        });

        if name == TOOL_REQUEST_VISUALIZATION {
            let vis_type = args.get("vis_type").and_then(Value::as_str).unwrap_or("");
            let description = args
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();

            let Some(kind) = VisKind::parse(vis_type) else {
                warn!("Unknown vis_type '{}' in visualization request", vis_type);
                self.upstream
                    .send_function_output(&call_id, &json!({"error": "unknown vis_type"}))
                    .await?;
                self.upstream.create_response().await?;
                return Ok(());
            };

            // Ack immediately and request a new turn so voice output is not
            // blocked on the heavy generation.
            self.upstream
                .send_function_output(
                    &call_id,
                    &json!({"status": "generating", "vis_type": kind.as_str()}),
                )
                .await?;
            self.upstream.create_response().await?;

            self.send(ServerFrame::VisualizationGenerating {
                vis_type: kind.as_str().to_string(),
                description: description.clone(),
            });

            // One in-flight task per kind: replacing cancels the previous.
            let (task_id, token) = self.pending.lock().unwrap().replace(kind);
            let mode = self.ctx.store.get_current();
            let persona = self.ctx.ensure_persona(&mode.id);
            let job = VisualizationJob::new(kind, description, mode, persona, &self.transcript);
            tokio::spawn(run_visualization_task(
                job,
                self.ctx.provider.clone(),
                self.upstream.clone(),
                self.client_tx.clone(),
                self.gate.clone(),
                self.pending.clone(),
                task_id,
                token,
            ));
        } else {
            // Defensive fallback for any other tool name: execute inline and
            // feed the result straight back.
            let result = execute_tool(&name, &args);
            self.send(ServerFrame::ToolResult {
                tool: name,
                result: result.clone(),
            });
            self.upstream.send_function_output(&call_id, &result).await?;
            self.upstream.create_response().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::modes::ModeStore;
    use crate::providers::base::{ChatProvider, ChatResponse, ToolCallRequest};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingPort {
        events: Mutex<Vec<Value>>,
    }

    impl RecordingPort {
        fn event_types(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| e["type"].as_str().unwrap_or("").to_string())
                .collect()
        }
    }

    #[async_trait]
    impl RealtimePort for RecordingPort {
        async fn send_event(&self, event: Value) -> Result<()> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    /// Classifier replies scripted per call; visualization calls hang until
    /// cancelled so registration state is observable.
    struct ScriptedProvider {
        chat_replies: Mutex<Vec<String>>,
        hang_on_tools: bool,
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn chat(
            &self,
            _messages: &[Value],
            tools: Option<&[Value]>,
        ) -> Result<ChatResponse> {
            if tools.is_some() && self.hang_on_tools {
                // Simulate a slow visualization round.
                std::future::pending::<()>().await;
            }
            let reply = self
                .chat_replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| r#"{"industry": null}"#.to_string());
            Ok(ChatResponse {
                content: Some(reply),
                tool_calls: Vec::<ToolCallRequest>::new(),
                finish_reason: "stop".into(),
            })
        }
    }

    struct Harness {
        model_loop: ModelLoop,
        upstream: Arc<RecordingPort>,
        client_rx: mpsc::UnboundedReceiver<ServerFrame>,
    }

    fn harness(chat_replies: Vec<&str>, hang_on_tools: bool) -> Harness {
        let provider = Arc::new(ScriptedProvider {
            chat_replies: Mutex::new(chat_replies.iter().map(|s| s.to_string()).collect()),
            hang_on_tools,
        });
        let store = Arc::new(ModeStore::new(None));
        let ctx = Arc::new(AppContext::new(Config::default(), store, provider));
        let upstream = Arc::new(RecordingPort::default());
        let (tx, rx) = mpsc::unbounded_channel();

        Harness {
            model_loop: ModelLoop {
                ctx,
                upstream: upstream.clone(),
                client_tx: tx,
                gate: Arc::new(Mutex::new(NotificationGate::new())),
                pending: Arc::new(Mutex::new(PendingVisualizations::new())),
                transcript: ConversationHistory::new(20),
            },
            upstream,
            client_rx: rx,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerFrame>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn test_barge_in_cancels_before_notifying() {
        let mut h = harness(vec![], false);
        h.model_loop
            .handle_event(RealtimeEvent::SpeechStarted)
            .await
            .unwrap();

        assert_eq!(h.upstream.event_types(), vec!["response.cancel"]);
        let frames = drain(&mut h.client_rx);
        assert_eq!(frames, vec![ServerFrame::SpeechStarted]);
    }

    #[tokio::test]
    async fn test_audio_and_transcript_deltas_forwarded_in_order() {
        let mut h = harness(vec![], false);
        h.model_loop
            .handle_event(RealtimeEvent::AudioDelta {
                delta: "AAA=".into(),
            })
            .await
            .unwrap();
        h.model_loop
            .handle_event(RealtimeEvent::TranscriptDelta {
                delta: "Your ".into(),
            })
            .await
            .unwrap();
        h.model_loop
            .handle_event(RealtimeEvent::TranscriptDelta {
                delta: "balance".into(),
            })
            .await
            .unwrap();

        let frames = drain(&mut h.client_rx);
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[0], ServerFrame::Audio { .. }));

        // Transcript deltas coalesce into one logical assistant entry.
        assert_eq!(h.model_loop.transcript.len(), 1);
        assert_eq!(
            h.model_loop.transcript.iter().next().unwrap().text,
            "Your balance"
        );
    }

    #[tokio::test]
    async fn test_response_lifecycle_gates_notifications() {
        let mut h = harness(vec![], false);

        h.model_loop
            .handle_event(RealtimeEvent::ResponseCreated)
            .await
            .unwrap();
        assert!(h.model_loop.gate.lock().unwrap().is_responding());

        // Two notifications arrive mid-utterance.
        assert!(h
            .model_loop
            .gate
            .lock()
            .unwrap()
            .submit("first ready".into())
            .is_none());
        assert!(h
            .model_loop
            .gate
            .lock()
            .unwrap()
            .submit("second ready".into())
            .is_none());
        assert!(h.upstream.events.lock().unwrap().is_empty());

        // response-done flushes FIFO: item.create/response.create per entry.
        h.model_loop
            .handle_event(RealtimeEvent::ResponseDone)
            .await
            .unwrap();
        assert!(!h.model_loop.gate.lock().unwrap().is_responding());

        let events = h.upstream.events.lock().unwrap();
        assert_eq!(events.len(), 4);
        assert!(events[0]["item"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("first ready"));
        assert_eq!(events[1]["type"], "response.create");
        assert!(events[2]["item"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("second ready"));
        assert_eq!(events[3]["type"], "response.create");
    }

    #[tokio::test]
    async fn test_user_transcript_without_wake_word_just_forwards() {
        let mut h = harness(vec![], false);
        h.model_loop
            .handle_event(RealtimeEvent::InputTranscriptCompleted {
                transcript: "what's my balance?".into(),
            })
            .await
            .unwrap();

        assert!(h.upstream.events.lock().unwrap().is_empty());
        let frames = drain(&mut h.client_rx);
        assert_eq!(
            frames,
            vec![ServerFrame::Transcript {
                role: "user".into(),
                text: "what's my balance?".into(),
            }]
        );
        assert_eq!(h.model_loop.transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_wake_word_switch_full_sequence() {
        let mut h = harness(vec![r#"{"industry": "healthcare", "company_name": null}"#], false);

        // Seed some transcript and a pending task to verify both reset.
        h.model_loop.transcript.push(Role::User, "earlier turn");
        let (_, old_token) = h.model_loop.pending.lock().unwrap().replace(VisKind::Chart);

        h.model_loop
            .handle_event(RealtimeEvent::InputTranscriptCompleted {
                transcript: "Presto, you're a hospital now".into(),
            })
            .await
            .unwrap();

        // Preemptive cancel happened before the classification; pending work
        // was cancelled; transcript was cleared.
        let types = h.upstream.event_types();
        assert_eq!(types[0], "response.cancel");
        assert!(old_token.is_cancelled());
        assert!(h.model_loop.transcript.is_empty());

        // session.update carries the voice tools + rewritten instructions,
        // then the authored greet turn and a response request.
        let events = h.upstream.events.lock().unwrap();
        let update = events.iter().find(|e| e["type"] == "session.update").unwrap();
        assert_eq!(
            update["session"]["tools"][0]["name"],
            TOOL_REQUEST_VISUALIZATION
        );
        assert!(update["session"]["instructions"]
            .as_str()
            .unwrap()
            .contains("request_visualization"));
        let greet = events
            .iter()
            .find(|e| e["type"] == "conversation.item.create")
            .unwrap();
        assert!(greet["item"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("switched to Healthcare mode"));
        assert_eq!(types.last().unwrap(), "response.create");
        drop(events);

        // Client saw: transcript, loading indicator, then the switch payload.
        let frames = drain(&mut h.client_rx);
        assert!(matches!(frames[0], ServerFrame::Transcript { .. }));
        assert!(matches!(frames[1], ServerFrame::ModeGenerating { .. }));
        let switch = frames
            .iter()
            .find_map(|f| match f {
                ServerFrame::ModeSwitch { payload } => Some(payload.clone()),
                _ => None,
            })
            .expect("mode_switch frame");
        assert_eq!(switch["mode"]["id"], "healthcare");
        assert!(switch["persona"].get("deductible").is_some());

        assert_eq!(h.model_loop.ctx.store.get_current().id, "healthcare");
    }

    #[tokio::test]
    async fn test_wake_word_without_switch_sends_cancel() {
        let mut h = harness(vec![r#"{"industry": null, "company_name": null}"#], false);

        h.model_loop
            .handle_event(RealtimeEvent::InputTranscriptCompleted {
                transcript: "presto is my dog's name".into(),
            })
            .await
            .unwrap();

        let frames = drain(&mut h.client_rx);
        assert!(frames
            .iter()
            .any(|f| matches!(f, ServerFrame::ModeGenerating { .. })));
        assert!(frames
            .iter()
            .any(|f| matches!(f, ServerFrame::ModeGeneratingCancel { .. })));
        // Only the preemptive cancel went upstream.
        assert_eq!(h.upstream.event_types(), vec!["response.cancel"]);
    }

    #[tokio::test]
    async fn test_visualization_request_acks_then_spawns() {
        let mut h = harness(vec![], true);

        h.model_loop
            .handle_event(RealtimeEvent::FunctionCallArgumentsDone {
                call_id: "c1".into(),
                name: TOOL_REQUEST_VISUALIZATION.into(),
                arguments: r#"{"vis_type": "chart", "description": "spending by month"}"#.into(),
            })
            .await
            .unwrap();

        // Ack ordering: function output first, then the new-turn request, so
        // voice output is never blocked on the background work.
        let types = h.upstream.event_types();
        assert_eq!(types, vec!["conversation.item.create", "response.create"]);
        {
            let events = h.upstream.events.lock().unwrap();
            assert_eq!(events[0]["item"]["type"], "function_call_output");
            assert_eq!(events[0]["item"]["call_id"], "c1");
        }

        let frames = drain(&mut h.client_rx);
        assert_eq!(
            frames,
            vec![ServerFrame::VisualizationGenerating {
                vis_type: "chart".into(),
                description: "spending by month".into(),
            }]
        );

        // The background task is registered (provider hangs, so it is still
        // in flight).
        assert!(h.model_loop.pending.lock().unwrap().is_pending(VisKind::Chart));

        // A second chart request cancels the first before registering anew.
        let first_token = {
            let mut pending = h.model_loop.pending.lock().unwrap();
            let (_, token) = pending.replace(VisKind::Chart);
            // put it back as-if still pending for the next handle call
            drop(pending);
            token
        };
        h.model_loop
            .handle_event(RealtimeEvent::FunctionCallArgumentsDone {
                call_id: "c2".into(),
                name: TOOL_REQUEST_VISUALIZATION.into(),
                arguments: r#"{"vis_type": "chart", "description": "income by month"}"#.into(),
            })
            .await
            .unwrap();
        assert!(first_token.is_cancelled());
        assert!(h.model_loop.pending.lock().unwrap().is_pending(VisKind::Chart));
    }

    #[tokio::test]
    async fn test_unknown_vis_type_is_rejected_gracefully() {
        let mut h = harness(vec![], true);

        h.model_loop
            .handle_event(RealtimeEvent::FunctionCallArgumentsDone {
                call_id: "c1".into(),
                name: TOOL_REQUEST_VISUALIZATION.into(),
                arguments: r#"{"vis_type": "hologram", "description": "3d"}"#.into(),
            })
            .await
            .unwrap();

        let events = h.upstream.events.lock().unwrap();
        assert!(events[0]["item"]["output"]
            .as_str()
            .unwrap()
            .contains("unknown vis_type"));
        assert!(h.model_loop.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_tool_name_executes_synchronously() {
        let mut h = harness(vec![], false);

        h.model_loop
            .handle_event(RealtimeEvent::FunctionCallArgumentsDone {
                call_id: "c9".into(),
                name: "show_metrics".into(),
                arguments: r#"{"metrics": [{"label": "x", "value": 1, "unit": "%"}]}"#.into(),
            })
            .await
            .unwrap();

        let frames = drain(&mut h.client_rx);
        assert!(matches!(
            frames[0],
            ServerFrame::ToolResult { ref tool, .. } if tool == "show_metrics"
        ));

        let types = h.upstream.event_types();
        assert_eq!(types, vec!["conversation.item.create", "response.create"]);
    }

    #[tokio::test]
    async fn test_error_event_is_forwarded_not_fatal() {
        let mut h = harness(vec![], false);
        h.model_loop
            .handle_event(RealtimeEvent::ErrorEvent {
                message: "turn truncated".into(),
            })
            .await
            .unwrap();

        let frames = drain(&mut h.client_rx);
        assert_eq!(
            frames,
            vec![ServerFrame::Error {
                error: "turn truncated".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_client_loop_honors_mute_and_stop() {
        let upstream = Arc::new(RecordingPort::default());
        let muted = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(ClientFrame::Audio { data: "AA==".into() }).unwrap();
        tx.send(ClientFrame::Mute { muted: true }).unwrap();
        tx.send(ClientFrame::Audio { data: "BB==".into() }).unwrap();
        tx.send(ClientFrame::Mute { muted: false }).unwrap();
        tx.send(ClientFrame::Audio { data: "CC==".into() }).unwrap();
        tx.send(ClientFrame::Stop).unwrap();

        client_loop(rx, upstream.clone(), muted).await.unwrap();

        let events = upstream.events.lock().unwrap();
        let audio: Vec<&str> = events
            .iter()
            .map(|e| e["audio"].as_str().unwrap())
            .collect();
        // The muted frame was dropped.
        assert_eq!(audio, vec!["AA==", "CC=="]);
    }
}
