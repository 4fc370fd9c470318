//! Voice-channel wire frames.
//!
//! Flat JSON envelopes (no payload wrapper, unlike the text channel).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound frame from the browser.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Base64 PCM16 microphone audio.
    Audio { data: String },
    /// Toggle the microphone mute flag.
    Mute { muted: bool },
    /// End the voice session cleanly.
    Stop,
}

/// Outbound frame to the browser.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Status { status: String },
    SpeechStarted,
    SpeechStopped,
    /// Base64 PCM16 assistant audio.
    Audio { data: String },
    Transcript { role: String, text: String },
    ToolResult { tool: String, result: Value },
    VisualizationGenerating { vis_type: String, description: String },
    ModeSwitch { payload: Value },
    ModeGenerating { payload: Value },
    ModeGeneratingCancel { payload: Value },
    Error { error: String },
}

impl ServerFrame {
    pub fn connected() -> Self {
        ServerFrame::Status {
            status: "connected".to_string(),
        }
    }

    pub fn disconnected() -> Self {
        ServerFrame::Status {
            status: "disconnected".to_string(),
        }
    }
}
