//! The hub actor: one task that owns the [`SignalingHub`].
//!
//! Every event that can touch pairing state (an inbound message, a
//! disconnect, a fired expiry timer, a sweep tick) is posted to this task as
//! a [`HubCommand`] and processed to completion before the next one is read.
//! There is no lock around the registries; the channel is the serialization
//! point.
//!
//! ```text
//!  session tasks ──┐
//!  expiry timers ──┼──► mpsc<HubCommand> ──► run_hub ──► SignalingHub
//!  sweeper ────────┘                            │
//!                                               ├─► per-connection outbound queues
//!                                               └─► ExpiryTimers
//! ```

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tracing::{debug, info, warn};

use pairlink_core::{Clock, ClientMessage, ConnectionId, Effect, ServerMessage, SignalingHub};

use crate::application::expiry::ExpiryTimers;

/// Events fed to the hub actor.
#[derive(Debug)]
pub enum HubCommand {
    /// A session finished its handshake; `outbound` is its delivery queue.
    Connected {
        conn: ConnectionId,
        outbound: Sender<ServerMessage>,
    },
    /// A decoded message arrived on `conn`.
    Inbound {
        conn: ConnectionId,
        message: ClientMessage,
    },
    /// The session for `conn` ended.
    Disconnected { conn: ConnectionId },
    /// The deferred expiry for one issuance fired.
    ExpireCode { code: String, serial: u64 },
    /// Periodic sweep tick.
    Sweep,
}

/// The hub actor is no longer running.
#[derive(Debug, Error)]
#[error("signaling hub has stopped")]
pub struct HubStopped;

/// Cloneable handle for posting commands to the hub actor.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: Sender<HubCommand>,
}

impl HubHandle {
    pub fn new(tx: Sender<HubCommand>) -> Self {
        Self { tx }
    }

    /// Posts `command`, waiting for room in the channel.
    ///
    /// # Errors
    ///
    /// [`HubStopped`] if the actor has exited.
    pub async fn send(&self, command: HubCommand) -> Result<(), HubStopped> {
        self.tx.send(command).await.map_err(|_| HubStopped)
    }
}

/// Spawns the hub actor on the current runtime.
///
/// The actor stops once every [`HubHandle`] clone has been dropped.
pub fn spawn_hub<C>(
    hub: SignalingHub<C>,
    command_queue: usize,
) -> (HubHandle, tokio::task::JoinHandle<()>)
where
    C: Clock + 'static,
{
    let (tx, rx) = mpsc::channel(command_queue);
    let timers = ExpiryTimers::new(&tx);
    let task = tokio::spawn(run_hub(hub, rx, timers));
    (HubHandle::new(tx), task)
}

/// The actor loop.
pub async fn run_hub<C: Clock>(
    mut hub: SignalingHub<C>,
    mut commands: Receiver<HubCommand>,
    mut timers: ExpiryTimers,
) {
    let mut sessions: HashMap<ConnectionId, Sender<ServerMessage>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        let effects = match command {
            HubCommand::Connected { conn, outbound } => {
                debug!("conn {conn}: session attached ({} live)", sessions.len() + 1);
                sessions.insert(conn, outbound);
                continue;
            }
            HubCommand::Inbound { conn, message } => {
                debug!("conn {conn}: {}", message.kind());
                hub.handle(conn, message)
            }
            HubCommand::Disconnected { conn } => {
                sessions.remove(&conn);
                hub.disconnect(conn)
            }
            HubCommand::ExpireCode { code, serial } => {
                timers.fired(serial);
                hub.expire_code(&code, serial)
            }
            HubCommand::Sweep => hub.sweep(),
        };

        dispatch(effects, &sessions, &mut timers);
    }

    info!(
        "hub actor stopped ({} pairs, {} codes outstanding)",
        hub.pairs().len(),
        hub.codes().len()
    );
}

/// Carries out the hub's effects.  Delivery never waits: a full or closed
/// queue loses the message.
fn dispatch(
    effects: Vec<Effect>,
    sessions: &HashMap<ConnectionId, Sender<ServerMessage>>,
    timers: &mut ExpiryTimers,
) {
    for effect in effects {
        match effect {
            Effect::Deliver { to, message } => {
                let Some(queue) = sessions.get(&to) else {
                    debug!("conn {to}: gone, dropping {}", message.kind());
                    continue;
                };
                match queue.try_send(message) {
                    Ok(()) => {}
                    Err(TrySendError::Full(message)) => {
                        warn!("conn {to}: outbound queue full, dropping {}", message.kind());
                    }
                    Err(TrySendError::Closed(message)) => {
                        debug!("conn {to}: writer closed, dropping {}", message.kind());
                    }
                }
            }
            Effect::ScheduleExpiry {
                code,
                serial,
                after,
            } => timers.schedule(code, serial, after),
            Effect::CancelExpiry { serial } => timers.cancel(serial),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
