//! Domain error types for presto.
//!
//! Typed errors at module boundaries replace string-encoded errors and let
//! callers pattern-match on the failure class: transport errors are terminal
//! for the affected session, model/classification errors degrade locally,
//! cancellation is never routed through these types.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Provider errors
// ---------------------------------------------------------------------------

/// Errors from LLM provider operations.
///
/// Embedded in `anyhow::Error` so the `ChatProvider` trait signature
/// (`-> anyhow::Result<ChatResponse>`) stays unchanged while callers can
/// downcast: `e.downcast_ref::<ProviderError>()`.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Failed to read response body: {0}")]
    ResponseReadError(String),

    #[error("Failed to parse response JSON: {0}")]
    JsonParseError(String),

    #[error("LLM API returned status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("LLM returned an empty response")]
    EmptyResponse,
}

// ---------------------------------------------------------------------------
// Relay errors
// ---------------------------------------------------------------------------

/// Errors that terminate a voice relay session.
///
/// Everything here is fatal to the affected session only; other sessions and
/// the process keep running.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to connect to realtime service: {0}")]
    ConnectFailed(String),

    #[error("Client socket closed: {0}")]
    ClientClosed(String),

    #[error("Realtime socket closed: {0}")]
    UpstreamClosed(String),

    #[error("Failed to send on realtime socket: {0}")]
    UpstreamSend(String),

    #[error("Failed to send to client: {0}")]
    ClientSend(String),
}
