//! Realtime voice relay: client frames, the session state machine, and
//! background visualization tasks.

pub mod frames;
pub mod session;
pub mod visualization;

pub use frames::{ClientFrame, ServerFrame};
pub use session::VoiceSession;
