// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-target trailing-edge debouncing of backend commands.
//!
//! Each `(device, command kind)` pair owns at most one pending timer. A new
//! schedule for the same key aborts the old timer and takes its place, so a
//! burst of slider or wheel events collapses into one command carrying the
//! last value. Timers are detached tasks: dropping the debouncer does not
//! cancel them, only [`CommandDebouncer::cancel_all`] does.

use crate::message::CoreEvent;
use crate::transport::Transport;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use volmix_ipc::Query;

/// What a command changes on its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Volume,
    Mute,
    DefaultDevice,
}

/// Identity of a debounce slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandKey {
    /// `None` for system-wide commands (default device selection).
    pub device_id: Option<String>,
    pub kind: CommandKind,
}

impl CommandKey {
    pub fn volume(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            kind: CommandKind::Volume,
        }
    }

    pub fn mute(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            kind: CommandKind::Mute,
        }
    }

    /// Default selection is one slot regardless of which device is picked.
    pub fn default_device() -> Self {
        Self {
            device_id: None,
            kind: CommandKind::DefaultDevice,
        }
    }

    /// Slot a query belongs to. `AudioDict` is never debounced.
    pub fn for_query(query: &Query) -> Option<Self> {
        match query {
            Query::AudioDict => None,
            Query::DefaultAudioChange { .. } => Some(Self::default_device()),
            Query::VolumeChange { id, .. } => Some(Self::volume(id.as_str())),
            Query::MuteStateChange { id, .. } => Some(Self::mute(id.as_str())),
        }
    }
}

/// A command waiting for its timer.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub key: CommandKey,
    pub payload: Query,
    pub scheduled_at: Instant,
}

struct PendingTimer {
    generation: u64,
    command: PendingCommand,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct TimerTable {
    timers: HashMap<CommandKey, PendingTimer>,
    next_generation: u64,
    /// Commands whose timer fired and whose dispatch has not finished.
    in_flight: usize,
}

impl TimerTable {
    fn is_idle(&self) -> bool {
        self.timers.is_empty() && self.in_flight == 0
    }
}

struct Shared {
    transport: Arc<dyn Transport>,
    table: Mutex<TimerTable>,
    idle: Notify,
    events: broadcast::Sender<CoreEvent>,
}

/// Owns the `(device, kind) -> timer` table.
pub struct CommandDebouncer {
    shared: Arc<Shared>,
}

impl CommandDebouncer {
    pub fn new(transport: Arc<dyn Transport>, events: broadcast::Sender<CoreEvent>) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                table: Mutex::new(TimerTable::default()),
                idle: Notify::new(),
                events,
            }),
        }
    }

    /// Send `payload` once `delay` passes without another schedule for `key`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, key: CommandKey, payload: Query, delay: Duration) {
        let mut table = self.shared.table.lock();
        table.next_generation += 1;
        let generation = table.next_generation;

        let command = PendingCommand {
            key: key.clone(),
            payload,
            scheduled_at: Instant::now(),
        };
        let handle = tokio::spawn(fire_after(
            Arc::clone(&self.shared),
            key.clone(),
            generation,
            delay,
        ));

        trace!("Scheduled {:?} in {:?}", key, delay);
        if let Some(previous) = table.timers.insert(
            key,
            PendingTimer {
                generation,
                command,
                handle,
            },
        ) {
            previous.handle.abort();
            trace!("Superseded {:?}", previous.command.payload);
        }
    }

    /// Drop every pending command without sending it. Returns how many were
    /// dropped. Commands already handed to the transport are unaffected.
    pub fn cancel_all(&self) -> usize {
        let mut table = self.shared.table.lock();
        let cancelled = table.timers.len();
        for (_, timer) in table.timers.drain() {
            timer.handle.abort();
        }
        if table.is_idle() {
            self.shared.idle.notify_waiters();
        }
        if cancelled > 0 {
            debug!("Cancelled {} pending commands", cancelled);
        }
        cancelled
    }

    /// The command currently waiting in `key`'s slot.
    pub fn pending(&self, key: &CommandKey) -> Option<PendingCommand> {
        self.shared
            .table
            .lock()
            .timers
            .get(key)
            .map(|timer| timer.command.clone())
    }

    pub fn pending_count(&self) -> usize {
        self.shared.table.lock().timers.len()
    }

    /// Resolve once no timer is pending and no command is mid-dispatch.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = std::pin::pin!(self.shared.idle.notified());
            notified.as_mut().enable();
            if self.shared.table.lock().is_idle() {
                return;
            }
            notified.await;
        }
    }
}

async fn fire_after(shared: Arc<Shared>, key: CommandKey, generation: u64, delay: Duration) {
    tokio::time::sleep(delay).await;

    let command = {
        let mut table = shared.table.lock();
        // A newer schedule or cancel_all may have claimed the slot while this
        // task was waking up.
        match table.timers.get(&key) {
            Some(timer) if timer.generation == generation => {}
            _ => return,
        }
        let Some(timer) = table.timers.remove(&key) else {
            return;
        };
        table.in_flight += 1;
        timer.command
    };

    dispatch(&shared, command.payload).await;

    let mut table = shared.table.lock();
    table.in_flight -= 1;
    if table.is_idle() {
        shared.idle.notify_waiters();
    }
}

async fn dispatch(shared: &Shared, query: Query) {
    debug!("Dispatching {}", query.kind());
    match shared.transport.invoke(query.clone()).await {
        Ok(()) => {
            let _ = shared.events.send(CoreEvent::CommandDispatched(query));
        }
        Err(e) => {
            warn!("{} for {:?} failed: {}", query.kind(), query.device_id(), e);
            let _ = shared.events.send(CoreEvent::CommandFailed {
                query,
                error: e.to_string(),
            });
        }
    }
}
