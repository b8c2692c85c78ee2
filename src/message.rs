// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Intents coming from the UI and events reported by the core.

use crate::resolver::DeviceSelector;
use volmix_ipc::Query;

/// How an input was produced, which decides its debounce delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Many ticks per second: slider drag, wheel.
    Continuous,
    /// Single-shot change: slider release, toggle, menu pick.
    Discrete,
}

/// User-originated request against the audio subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    // ==================== Volume ====================
    /// Slider moved to an absolute volume (0.0-1.0).
    SetVolume {
        device: DeviceSelector,
        volume: f32,
        gesture: Gesture,
    },
    /// Mouse wheel tick over the meter. `delta_y` wins when non-zero.
    Wheel {
        device: DeviceSelector,
        delta_x: f64,
        delta_y: f64,
    },

    // ==================== Mute ====================
    /// Mute button pressed.
    ToggleMute { device: DeviceSelector },
    /// Set mute to an explicit state.
    SetMute { device: DeviceSelector, muted: bool },

    // ==================== Default device ====================
    /// Device picked from the context menu.
    SetDefault { id: String },
}

impl Intent {
    pub fn set_volume(device: impl Into<DeviceSelector>, volume: f32, gesture: Gesture) -> Self {
        Intent::SetVolume {
            device: device.into(),
            volume,
            gesture,
        }
    }

    pub fn wheel(device: impl Into<DeviceSelector>, delta_y: f64) -> Self {
        Intent::Wheel {
            device: device.into(),
            delta_x: 0.0,
            delta_y,
        }
    }

    pub fn toggle_mute(device: impl Into<DeviceSelector>) -> Self {
        Intent::ToggleMute {
            device: device.into(),
        }
    }
}

/// Events the core reports to observers (status line, toast, logs).
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// A push replaced the mirrored snapshot.
    SnapshotApplied {
        generation: u64,
        devices: usize,
        default_device_id: Option<String>,
    },
    /// A push was malformed; the previous snapshot is still in effect.
    PushRejected(String),
    /// A command reached the backend.
    CommandDispatched(Query),
    /// A command could not be delivered. It is not retried.
    CommandFailed { query: Query, error: String },
}
