//! Deferred code expiry and the periodic ExpirySweeper.
//!
//! Both only post commands back to the hub actor; neither touches the
//! registries directly.  Whatever they post is re-checked by the hub
//! (code still present, same serial, still unconsumed), so a timer that fires
//! late or a sweep that races a redemption does no harm.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc::{Sender, WeakSender};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::debug;

use crate::application::hub_actor::{HubCommand, HubHandle};

/// One-shot expiry timers keyed by code serial.
///
/// Timer tasks hold only a weak sender, so pending timers never keep the hub
/// actor alive after every connection and the server are gone.
pub struct ExpiryTimers {
    commands: WeakSender<HubCommand>,
    pending: HashMap<u64, AbortHandle>,
}

impl ExpiryTimers {
    pub fn new(commands: &Sender<HubCommand>) -> Self {
        Self {
            commands: commands.downgrade(),
            pending: HashMap::new(),
        }
    }

    /// Posts `ExpireCode { code, serial }` to the hub once `after` elapses.
    pub fn schedule(&mut self, code: String, serial: u64, after: Duration) {
        let commands = self.commands.clone();
        let task = tokio::spawn(async move {
            sleep(after).await;
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(HubCommand::ExpireCode { code, serial }).await;
            }
        });
        if let Some(previous) = self.pending.insert(serial, task.abort_handle()) {
            previous.abort();
        }
    }

    /// Aborts the timer for `serial`, if it is still pending.
    pub fn cancel(&mut self, serial: u64) {
        if let Some(handle) = self.pending.remove(&serial) {
            debug!("cancelled expiry timer #{serial}");
            handle.abort();
        }
    }

    /// Forgets the timer for `serial` after it has fired.
    pub fn fired(&mut self, serial: u64) {
        self.pending.remove(&serial);
    }

    /// Number of timers still pending.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Drop for ExpiryTimers {
    fn drop(&mut self) {
        for handle in self.pending.values() {
            handle.abort();
        }
    }
}

/// Spawns the background sweep: posts [`HubCommand::Sweep`] every `period`.
///
/// The first sweep runs one full period after start.  The task ends on its
/// own once the hub actor has stopped.
pub fn spawn_sweeper(hub: HubHandle, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // The first tick resolves immediately.

        loop {
            ticker.tick().await;
            if hub.send(HubCommand::Sweep).await.is_err() {
                debug!("hub stopped; sweeper exiting");
                break;
            }
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
