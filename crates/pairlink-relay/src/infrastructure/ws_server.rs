//! WebSocket server: accept loop and per-session task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Starting the hub actor and the ExpirySweeper.
//! 3. Accepting browser connections and upgrading each to a WebSocket session.
//! 4. Running two concurrent tasks per session:
//!    - **Reader**: text frame → `ClientMessage` → hub actor.
//!    - **Writer**: outbound queue → `ServerMessage` → text frame.
//! 5. Reporting the disconnect to the hub when either task ends.
//! 6. Stopping the accept loop when the `running` flag is cleared.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use pairlink_core::protocol::{decode_client_message, encode_server_message};
use pairlink_core::{ConnectionId, ServerMessage, SignalingHub};

use crate::application::{spawn_hub, spawn_sweeper, HubCommand, HubHandle};
use crate::domain::RelayConfig;

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.ws_bind_addr` and serves until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(config: RelayConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.ws_bind_addr)
        .await
        .with_context(|| {
            format!(
                "failed to bind WebSocket listener on {}",
                config.ws_bind_addr
            )
        })?;

    info!("pairlink relay listening on {}", config.ws_bind_addr);
    serve(listener, config, running).await
}

/// Runs the relay on an already-bound listener.
///
/// Starts the hub actor and the sweeper, then accepts connections until
/// `running` is cleared.  Sessions still open at that point keep running
/// until their peers hang up.
///
/// Tests bind `127.0.0.1:0` themselves and call this directly.
pub async fn serve(
    listener: TcpListener,
    config: RelayConfig,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let hub = SignalingHub::new(config.code_ttl);
    let (handle, _hub_task) = spawn_hub(hub, config.command_queue);
    let sweeper = spawn_sweeper(handle.clone(), config.sweep_interval);
    let outbound_queue = config.outbound_queue;

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new connection from {peer_addr}");
                let hub = handle.clone();
                tokio::spawn(async move {
                    handle_peer_session(stream, peer_addr, hub, outbound_queue).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error (e.g., too many open file descriptors).
                error!("accept error: {e}");
            }
            Err(_) => {
                // No connection in the last poll interval.
            }
        }
    }

    sweeper.abort();
    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Wraps [`run_session`] and logs the outcome.
async fn handle_peer_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    hub: HubHandle,
    outbound_queue: usize,
) {
    match run_session(raw_stream, peer_addr, hub, outbound_queue).await {
        Ok(()) => debug!("session {peer_addr} closed normally"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs one WebSocket session from handshake to disconnect.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails or the hub actor has
/// stopped.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    hub: HubHandle,
    outbound_queue: usize,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let conn = ConnectionId::new();
    info!("conn {conn}: session established from {peer_addr}");

    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(outbound_queue);
    hub.send(HubCommand::Connected {
        conn,
        outbound: out_tx.clone(),
    })
    .await
    .context("hub stopped before session could attach")?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // ── Writer: outbound queue → WebSocket ───────────────────────────────────
    let writer_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let frame = match encode_server_message(&message) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("conn {conn}: failed to encode {}: {e}", message.kind());
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(frame)).await.is_err() {
                debug!("conn {conn}: WebSocket send failed (peer disconnected)");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // ── Reader: WebSocket → hub actor ────────────────────────────────────────
    let reader_hub = hub.clone();
    let reader_task = tokio::spawn(async move {
        loop {
            let ws_msg = match ws_rx.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                    debug!("conn {conn}: WebSocket closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!("conn {conn}: WebSocket error: {e}");
                    break;
                }
                None => {
                    debug!("conn {conn}: stream ended");
                    break;
                }
            };

            match ws_msg {
                WsMessage::Text(frame) => match decode_client_message(&frame) {
                    Ok(message) => {
                        let command = HubCommand::Inbound { conn, message };
                        if reader_hub.send(command).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // One bad frame does not end the session.
                        debug!("conn {conn}: rejected frame: {e}");
                        let reply = ServerMessage::Error {
                            message: e.to_string(),
                        };
                        if out_tx.try_send(reply).is_err() {
                            warn!("conn {conn}: outbound queue full, dropping error");
                        }
                    }
                },
                WsMessage::Binary(_) => {
                    debug!("conn {conn}: binary frame ignored");
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
                WsMessage::Close(_) => {
                    debug!("conn {conn}: Close frame received");
                    break;
                }
            }
        }
    });

    // The writer is left to drain: it exits once the hub drops this
    // connection's queue after `Disconnected`.
    let reader_abort = reader_task.abort_handle();
    tokio::select! {
        _ = reader_task => {
            debug!("conn {conn}: reader task ended");
        }
        _ = writer_task => {
            debug!("conn {conn}: writer task ended");
        }
    }
    reader_abort.abort();

    hub.send(HubCommand::Disconnected { conn })
        .await
        .context("hub stopped before disconnect was recorded")?;
    info!("conn {conn}: session closed");
    Ok(())
}
