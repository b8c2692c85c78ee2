// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mirror of the backend's audio subsystem state.
//!
//! The backend is the sole source of truth for which devices exist and in what
//! order, so every push replaces the held snapshot wholesale. Nothing from the
//! previous snapshot survives an apply.

use std::sync::Arc;
use tracing::{debug, warn};
use volmix_ipc::{decode_push, AudioSubsystemSnapshot, PushError};

/// Last-known-authoritative snapshot of the audio subsystem.
#[derive(Debug, Default)]
pub struct StateMirror {
    current: Option<Arc<AudioSubsystemSnapshot>>,
    /// Number of snapshots applied so far.
    generation: u64,
}

impl StateMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held snapshot.
    pub fn apply(&mut self, snapshot: AudioSubsystemSnapshot) -> Arc<AudioSubsystemSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.generation += 1;
        debug!(
            "Snapshot #{} applied: {} devices, default {:?}",
            self.generation,
            snapshot.devices.len(),
            snapshot.default_device_id
        );
        self.current = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Decode a raw push and apply it.
    ///
    /// A payload that fails to decode or validate leaves the previous snapshot
    /// in place.
    pub fn apply_push(&mut self, raw: &str) -> Result<Arc<AudioSubsystemSnapshot>, PushError> {
        match decode_push(raw) {
            Ok(payload) => {
                if let Some(notification) = &payload.notification {
                    debug!("Push notification: {}", notification);
                }
                Ok(self.apply(payload.audio_state))
            }
            Err(e) => {
                warn!("Rejected audio state push: {}", e);
                Err(e)
            }
        }
    }

    /// Latest snapshot, or `None` before the first push arrives.
    pub fn current(&self) -> Option<Arc<AudioSubsystemSnapshot>> {
        self.current.clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
