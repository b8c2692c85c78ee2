// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Local values shown while a command is on its way to the backend.
//!
//! An entry lives until the next snapshot that contains its device, at which
//! point the backend's value takes over. There is no ordering check between
//! the two: a push that predates the user's last edit still wins.

use std::collections::HashMap;
use tokio::time::Instant;
use volmix_ipc::{AudioDeviceInfo, AudioSubsystemSnapshot};

/// Which device property an optimistic value covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Volume,
    Muted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalValue {
    Volume(f32),
    Muted(bool),
}

impl LocalValue {
    pub fn field(&self) -> Field {
        match self {
            LocalValue::Volume(_) => Field::Volume,
            LocalValue::Muted(_) => Field::Muted,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticValue {
    pub device_id: String,
    pub value: LocalValue,
    pub assigned_at: Instant,
}

/// Read-through layer over the mirrored snapshot.
#[derive(Debug, Default)]
pub struct OptimisticOverlay {
    entries: HashMap<(String, Field), OptimisticValue>,
}

impl OptimisticOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a local edit, replacing any earlier one for the same field.
    /// Returns the replaced entry.
    pub fn set_local(&mut self, device_id: &str, value: LocalValue) -> Option<OptimisticValue> {
        self.entries.insert(
            (device_id.to_string(), value.field()),
            OptimisticValue {
                device_id: device_id.to_string(),
                value,
                assigned_at: Instant::now(),
            },
        )
    }

    pub fn get(&self, device_id: &str, field: Field) -> Option<&OptimisticValue> {
        self.entries.get(&(device_id.to_string(), field))
    }

    pub fn volume(&self, device_id: &str) -> Option<f32> {
        match self.get(device_id, Field::Volume)?.value {
            LocalValue::Volume(v) => Some(v),
            LocalValue::Muted(_) => None,
        }
    }

    pub fn muted(&self, device_id: &str) -> Option<bool> {
        match self.get(device_id, Field::Muted)?.value {
            LocalValue::Muted(m) => Some(m),
            LocalValue::Volume(_) => None,
        }
    }

    /// Drop every entry whose device is present in `snapshot`. Entries for
    /// devices the snapshot does not list are kept. Returns how many were
    /// dropped.
    pub fn reconcile(&mut self, snapshot: &AudioSubsystemSnapshot) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|(device_id, _), _| !snapshot.contains(device_id));
        before - self.entries.len()
    }

    /// Volume to display: local edit, else mirrored value, else 0.
    pub fn display_volume(&self, device_id: &str, mirrored: Option<&AudioDeviceInfo>) -> f32 {
        self.volume(device_id)
            .or_else(|| mirrored.map(|d| d.volume))
            .unwrap_or(0.0)
    }

    /// Mute state to display: local edit, else mirrored value, else unmuted.
    pub fn display_muted(&self, device_id: &str, mirrored: Option<&AudioDeviceInfo>) -> bool {
        self.muted(device_id)
            .or_else(|| mirrored.map(|d| d.muted))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
