// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! VolMix - audio state sync and command dispatch for a volume meter widget.
//!
//! The backend owns the audio devices and pushes full snapshots whenever
//! anything changes. This crate mirrors those snapshots, shows local edits
//! immediately, and coalesces bursts of input into single backend commands.

pub mod bridge;
pub mod config;
pub mod debounce;
pub mod menu;
pub mod message;
pub mod mixer;
pub mod overlay;
pub mod resolver;
pub mod state;
pub mod transport;
pub mod view;

pub use bridge::{BridgeError, BridgeHandle, BridgeSettings, BridgeState, EventBridge};
pub use message::{CoreEvent, Gesture, Intent};
pub use mixer::{CoreError, CoreSettings, MixerCore};
pub use resolver::DeviceSelector;
pub use view::{DeviceView, VolumeIcon};
pub use volmix_ipc::{AudioDeviceInfo, AudioSubsystemSnapshot, Query};
