//! LLM transport clients: buffered/streaming chat completions and the
//! realtime voice socket.

pub mod base;
pub mod openai_compat;
pub mod realtime;

pub use base::{ChatProvider, ChatResponse, StreamChunk, StreamHandle, ToolCallRequest};
pub use openai_compat::OpenAiCompatProvider;
pub use realtime::{RealtimeEvent, RealtimePort, RealtimeReceiver, RealtimeSender};
