//! Realtime voice socket client.
//!
//! Full-duplex event stream to the voice-capable model. The connection splits
//! into a cloneable sender (both relay loops and background tasks write) and
//! a receiver that yields one tagged [`RealtimeEvent`] per upstream message,
//! no speculative field probing at the call sites.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::errors::RelayError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Upstream events
// ---------------------------------------------------------------------------

/// One event from the realtime transport, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    SessionCreated,
    SessionUpdated,
    /// User started speaking (server VAD).
    SpeechStarted,
    /// User stopped speaking.
    SpeechStopped,
    /// The user's utterance finished transcribing.
    InputTranscriptCompleted { transcript: String },
    /// A model response turn started.
    ResponseCreated,
    /// The response turn finished (done or cancelled).
    ResponseDone,
    /// Output audio chunk (base64 PCM16).
    AudioDelta { delta: String },
    /// Output transcript fragment.
    TranscriptDelta { delta: String },
    /// A tool call's arguments finished streaming.
    FunctionCallArgumentsDone {
        call_id: String,
        name: String,
        arguments: String,
    },
    /// Transport-level error event; does not by itself end the stream.
    ErrorEvent { message: String },
    /// Any event kind we don't react to.
    Other(String),
}

impl RealtimeEvent {
    /// Parse a raw upstream JSON message into a tagged event.
    ///
    /// Returns `None` for unparseable payloads (logged and skipped).
    pub fn parse(raw: &str) -> Option<RealtimeEvent> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let event_type = value.get("type")?.as_str()?;

        let event = match event_type {
            "session.created" => RealtimeEvent::SessionCreated,
            "session.updated" => RealtimeEvent::SessionUpdated,
            "input_audio_buffer.speech_started" => RealtimeEvent::SpeechStarted,
            "input_audio_buffer.speech_stopped" => RealtimeEvent::SpeechStopped,
            "conversation.item.input_audio_transcription.completed" => {
                RealtimeEvent::InputTranscriptCompleted {
                    transcript: value
                        .get("transcript")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                }
            }
            "response.created" => RealtimeEvent::ResponseCreated,
            "response.done" => RealtimeEvent::ResponseDone,
            "response.audio.delta" => RealtimeEvent::AudioDelta {
                delta: value
                    .get("delta")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
            },
            "response.audio_transcript.delta" => RealtimeEvent::TranscriptDelta {
                delta: value
                    .get("delta")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
            },
            "response.function_call_arguments.done" => RealtimeEvent::FunctionCallArgumentsDone {
                call_id: value
                    .get("call_id")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                name: value
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                arguments: value
                    .get("arguments")
                    .and_then(Value::as_str)
                    .unwrap_or("{}")
                    .to_string(),
            },
            "error" => RealtimeEvent::ErrorEvent {
                message: value
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_string(),
            },
            other => RealtimeEvent::Other(other.to_string()),
        };
        Some(event)
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Connect to the realtime endpoint and split the socket.
pub async fn connect(url: &str, api_key: &str) -> Result<(RealtimeSender, RealtimeReceiver)> {
    let mut request = url
        .into_client_request()
        .map_err(|e| RelayError::ConnectFailed(e.to_string()))?;
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", api_key)
            .parse()
            .map_err(|_| RelayError::ConnectFailed("invalid api key header".into()))?,
    );
    request.headers_mut().insert(
        "OpenAI-Beta",
        "realtime=v1"
            .parse()
            .expect("static header value"),
    );

    info!("Connecting to realtime endpoint: {}", url);
    let (ws, _) = connect_async(request)
        .await
        .map_err(|e| RelayError::ConnectFailed(e.to_string()))?;
    info!("Connected to realtime endpoint");

    let (sink, stream) = ws.split();
    Ok((
        RealtimeSender {
            sink: Arc::new(Mutex::new(sink)),
        },
        RealtimeReceiver { stream },
    ))
}

/// Typed send surface of the realtime socket.
///
/// The relay loops and background tasks talk to the model through this trait;
/// the concrete [`RealtimeSender`] provides the socket, tests substitute a
/// recording mock.
#[async_trait]
pub trait RealtimePort: Send + Sync {
    /// Send a raw event object upstream.
    async fn send_event(&self, event: Value) -> Result<()>;

    /// Append a base64 PCM16 audio chunk to the model's input buffer.
    async fn append_audio(&self, audio_b64: &str) -> Result<()> {
        self.send_event(json!({
            "type": "input_audio_buffer.append",
            "audio": audio_b64,
        }))
        .await
    }

    /// Cancel any in-progress model response (barge-in).
    async fn cancel_response(&self) -> Result<()> {
        self.send_event(json!({"type": "response.cancel"})).await
    }

    /// Ask the model to generate a new response turn.
    async fn create_response(&self) -> Result<()> {
        self.send_event(json!({"type": "response.create"})).await
    }

    /// Push a session configuration update.
    async fn update_session(&self, session: Value) -> Result<()> {
        self.send_event(json!({"type": "session.update", "session": session}))
            .await
    }

    /// Inject an authored user text turn into the conversation timeline.
    async fn create_user_text_item(&self, text: &str) -> Result<()> {
        self.send_event(json!({
            "type": "conversation.item.create",
            "item": {
                "type": "message",
                "role": "user",
                "content": [{"type": "input_text", "text": text}],
            }
        }))
        .await
    }

    /// Feed a function call result back into the conversation timeline.
    async fn send_function_output(&self, call_id: &str, output: &Value) -> Result<()> {
        self.send_event(json!({
            "type": "conversation.item.create",
            "item": {
                "type": "function_call_output",
                "call_id": call_id,
                "output": output.to_string(),
            }
        }))
        .await
    }
}

/// Write half of the realtime socket. Cheap to clone; sends are serialized
/// through an async mutex so relay loops and background tasks can share it.
#[derive(Clone)]
pub struct RealtimeSender {
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
}

#[async_trait]
impl RealtimePort for RealtimeSender {
    async fn send_event(&self, event: Value) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(event.to_string()))
            .await
            .map_err(|e| RelayError::UpstreamSend(e.to_string()))?;
        Ok(())
    }
}

impl RealtimeSender {
    /// Close the upstream socket (best effort).
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Close(None)).await {
            debug!("Realtime close failed (already gone?): {}", e);
        }
    }
}

/// Read half of the realtime socket.
pub struct RealtimeReceiver {
    stream: SplitStream<WsStream>,
}

impl RealtimeReceiver {
    /// Receive the next upstream event.
    ///
    /// Returns `None` when the socket closes cleanly, `Some(Err(..))` on a
    /// transport failure. Unparseable payloads are skipped.
    pub async fn next_event(&mut self) -> Option<Result<RealtimeEvent>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => match RealtimeEvent::parse(&text) {
                    Some(event) => return Some(Ok(event)),
                    None => {
                        warn!("Skipping unparseable realtime message ({} bytes)", text.len());
                    }
                },
                Ok(Message::Close(_)) => {
                    info!("Realtime connection closed by server");
                    return None;
                }
                Ok(_) => {
                    // Binary/ping/pong frames carry nothing for us.
                }
                Err(e) => {
                    return Some(Err(RelayError::UpstreamClosed(e.to_string()).into()));
                }
            }
        }
    }
}
