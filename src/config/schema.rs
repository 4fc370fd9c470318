//! Configuration schema for presto.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` so that the JSON
//! config file can use camelCase keys while Rust code uses snake_case fields.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Server config
// ---------------------------------------------------------------------------

/// WebSocket gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// LLM config
// ---------------------------------------------------------------------------

/// Chat-completions endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-5-mini".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f64 {
    0.7
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_api_base(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

// ---------------------------------------------------------------------------
// Realtime voice config
// ---------------------------------------------------------------------------

/// Realtime voice socket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeConfig {
    /// Full wss:// URL of the realtime endpoint. When empty it is derived
    /// from `llm.apiBase` by swapping the scheme and appending `/realtime`.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_realtime_model")]
    pub model: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    /// Server VAD speech-detection threshold (0.0-1.0).
    #[serde(default = "default_vad_threshold")]
    pub vad_threshold: f64,
    #[serde(default = "default_prefix_padding_ms")]
    pub prefix_padding_ms: u32,
    #[serde(default = "default_silence_duration_ms")]
    pub silence_duration_ms: u32,
}

fn default_realtime_model() -> String {
    "gpt-realtime".to_string()
}

fn default_voice() -> String {
    "verse".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_vad_threshold() -> f64 {
    0.5
}

fn default_prefix_padding_ms() -> u32 {
    300
}

fn default_silence_duration_ms() -> u32 {
    500
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            model: default_realtime_model(),
            voice: default_voice(),
            transcription_model: default_transcription_model(),
            vad_threshold: default_vad_threshold(),
            prefix_padding_ms: default_prefix_padding_ms(),
            silence_duration_ms: default_silence_duration_ms(),
        }
    }
}

impl RealtimeConfig {
    /// Resolve the realtime websocket URL.
    ///
    /// Uses the explicit `url` when set; otherwise derives it from the chat
    /// API base (`https://host/v1` becomes `wss://host/v1/realtime`) with the
    /// model as a query parameter.
    pub fn resolve_url(&self, api_base: &str) -> String {
        if !self.url.is_empty() {
            return self.url.clone();
        }
        let base = api_base
            .trim_end_matches('/')
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/realtime?model={}", base, self.model)
    }
}

// ---------------------------------------------------------------------------
// Chat session config
// ---------------------------------------------------------------------------

/// Conversation history and response cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Maximum retained conversation/transcript turns.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_history_cap() -> usize {
    20
}

fn default_cache_capacity() -> usize {
    50
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration object (`~/.presto/config.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}
