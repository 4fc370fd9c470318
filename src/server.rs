//! WebSocket gateway.
//!
//! One TCP listener, routed by upgrade path: `/ws` carries the text chat
//! channel, `/ws/voice` the realtime voice relay. Each connection gets its
//! own handler task; a failed session never affects the others.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chat::{ChatEvent, ChatSession};
use crate::context::AppContext;
use crate::voice::frames::ClientFrame;
use crate::voice::VoiceSession;

/// Inbound text-channel envelope.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TextMessage {
    Chat { payload: ChatPayload },
}

#[derive(Debug, Deserialize)]
struct ChatPayload {
    #[serde(default)]
    text: String,
}

/// The WebSocket gateway server.
pub struct Gateway {
    ctx: Arc<AppContext>,
    shutdown: Arc<tokio::sync::Notify>,
}

impl Gateway {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            shutdown: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Serve until [`stop`](Self::stop) is called.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!(
            "{}:{}",
            self.ctx.config.server.host, self.ctx.config.server.port
        )
        .parse()?;

        let listener = TcpListener::bind(&addr).await?;
        info!("Gateway listening on ws://{}", addr);
        info!("  text channel:  ws://{}/ws", addr);
        info!("  voice channel: ws://{}/ws/voice", addr);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let ctx = self.ctx.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(ctx, stream, peer_addr).await {
                                    error!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Gateway shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Signal the accept loop to exit.
    pub fn stop(&self) {
        self.shutdown.notify_waiters();
    }
}

/// Complete the WebSocket handshake and dispatch on the upgrade path.
async fn handle_connection(
    ctx: Arc<AppContext>,
    stream: TcpStream,
    peer_addr: SocketAddr,
) -> Result<()> {
    let mut path = String::new();
    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        path = req.uri().path().to_string();
        match path.as_str() {
            "/ws" | "/ws/voice" => Ok(resp),
            other => {
                warn!("Rejecting upgrade for unknown path {}", other);
                let mut reject = ErrorResponse::new(Some("not found".to_string()));
                *reject.status_mut() = tokio_tungstenite::tungstenite::http::StatusCode::NOT_FOUND;
                Err(reject)
            }
        }
    })
    .await?;

    let session_id = Uuid::new_v4();
    info!("WebSocket connection from {} on {} ({})", peer_addr, path, session_id);

    match path.as_str() {
        "/ws" => text_channel(ctx, ws).await,
        "/ws/voice" => voice_channel(ctx, ws).await,
        _ => unreachable!("rejected during handshake"),
    }
}

/// Text chat channel: one `chat` message per turn, streamed envelopes out.
async fn text_channel(
    ctx: Arc<AppContext>,
    ws: tokio_tungstenite::WebSocketStream<TcpStream>,
) -> Result<()> {
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ChatEvent>();

    // Writer task drains session events concurrently so streamed chunks
    // reach the client while a turn is still in progress.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to serialize chat event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let session = ChatSession::new(ctx, tx.clone());

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<TextMessage>(&text) {
                Ok(TextMessage::Chat { payload }) if !payload.text.is_empty() => {
                    session.handle_message(&payload.text).await?;
                }
                Ok(TextMessage::Chat { .. }) => {
                    let _ = tx.send(ChatEvent::ChatError {
                        error: "Chat message text is required".to_string(),
                    });
                }
                Err(e) => {
                    debug!("Invalid text-channel message: {}", e);
                    let _ = tx.send(ChatEvent::ChatError {
                        error: format!("Invalid message: {}", e),
                    });
                }
            },
            Ok(Message::Close(_)) => {
                info!("Text channel closed by client");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Text channel error: {}", e);
                break;
            }
        }
    }

    drop(session);
    drop(tx);
    let _ = writer.await;
    Ok(())
}

/// Voice channel: parse client frames in, serialize server frames out, and
/// run the relay session in between.
async fn voice_channel(
    ctx: Arc<AppContext>,
    ws: tokio_tungstenite::WebSocketStream<TcpStream>,
) -> Result<()> {
    let (mut sink, mut stream) = ws.split();
    let (frame_tx, frame_rx) = mpsc::unbounded_channel::<ClientFrame>();
    let (server_tx, mut server_rx) = mpsc::unbounded_channel();

    let writer = tokio::spawn(async move {
        while let Some(frame) = server_rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to serialize voice frame: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let reader = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => {
                        if frame_tx.send(frame).is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!("Skipping invalid voice frame: {}", e),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Voice channel error: {}", e);
                    break;
                }
            }
        }
        // Dropping frame_tx ends the session's client loop.
    });

    let result = VoiceSession::new(ctx).run(frame_rx, server_tx).await;

    reader.abort();
    let _ = writer.await;
    result
}
