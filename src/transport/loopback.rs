// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! In-process stand-in for the native audio backend.
//!
//! Behaves like the real service: commands mutate its device table, commands
//! naming an unknown device are ignored, and every change is answered with a
//! full snapshot push to all subscribers. Used by the tests and by the CLI's
//! `--loopback` mode.

use super::{PushStream, Transport, TransportError};
use futures::future::{self, BoxFuture, FutureExt};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};
use volmix_ipc::{AudioDeviceInfo, AudioStateChangePayload, AudioSubsystemSnapshot, Query};

/// One call made against the backend, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopbackCall {
    Subscribe,
    Invoke(Query),
}

#[derive(Default)]
struct LoopbackState {
    snapshot: AudioSubsystemSnapshot,
    subscribers: Vec<mpsc::UnboundedSender<String>>,
    calls: Vec<LoopbackCall>,
    failing_subscribes: u32,
    fail_invokes: bool,
}

impl LoopbackState {
    fn apply(&mut self, query: &Query) -> bool {
        match query {
            Query::AudioDict => true,
            Query::DefaultAudioChange { id } => {
                if self.snapshot.contains(id) {
                    self.snapshot.default_device_id = Some(id.clone());
                    true
                } else {
                    false
                }
            }
            Query::VolumeChange { id, volume } => match self.device_mut(id) {
                Some(device) => {
                    device.volume = volume.clamp(0.0, 1.0);
                    true
                }
                None => false,
            },
            Query::MuteStateChange { id, muted } => match self.device_mut(id) {
                Some(device) => {
                    device.muted = *muted;
                    true
                }
                None => false,
            },
        }
    }

    fn device_mut(&mut self, id: &str) -> Option<&mut AudioDeviceInfo> {
        self.snapshot.devices.iter_mut().find(|d| d.id == id)
    }

    fn broadcast(&mut self) {
        match AudioStateChangePayload::new(self.snapshot.clone()).to_json() {
            Ok(raw) => self.send_raw(raw),
            Err(e) => warn!("Failed to encode loopback snapshot: {}", e),
        }
    }

    fn send_raw(&mut self, raw: String) {
        self.subscribers.retain(|tx| tx.send(raw.clone()).is_ok());
    }
}

/// Simulated backend holding its own device table.
#[derive(Clone, Default)]
pub struct LoopbackBackend {
    inner: Arc<Mutex<LoopbackState>>,
}

impl LoopbackBackend {
    pub fn new(snapshot: AudioSubsystemSnapshot) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LoopbackState {
                snapshot,
                ..Default::default()
            })),
        }
    }

    /// A backend with two typical output devices.
    pub fn demo() -> Self {
        let mut headphones = AudioDeviceInfo::new("loopback-headphones", "Headphones", 0.35, false);
        headphones.icon = Some("audio-headphones".to_string());
        Self::new(AudioSubsystemSnapshot::new(
            vec![
                AudioDeviceInfo::new("loopback-speakers", "Speakers", 0.5, false),
                headphones,
            ],
            Some("loopback-speakers"),
        ))
    }

    /// The backend's own view of the device table.
    pub fn snapshot(&self) -> AudioSubsystemSnapshot {
        self.inner.lock().snapshot.clone()
    }

    pub fn calls(&self) -> Vec<LoopbackCall> {
        self.inner.lock().calls.clone()
    }

    /// Every command received so far, including ones for unknown devices.
    pub fn invoked(&self) -> Vec<Query> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                LoopbackCall::Invoke(query) => Some(query.clone()),
                LoopbackCall::Subscribe => None,
            })
            .collect()
    }

    /// Make the next `count` subscribe calls fail.
    pub fn fail_next_subscribes(&self, count: u32) {
        self.inner.lock().failing_subscribes = count;
    }

    /// Make every command fail until switched back.
    pub fn set_fail_invokes(&self, fail: bool) {
        self.inner.lock().fail_invokes = fail;
    }

    /// Deliver an arbitrary payload on the push channel.
    pub fn push_raw(&self, raw: impl Into<String>) {
        self.inner.lock().send_raw(raw.into());
    }

    /// Push the current device table.
    pub fn push_snapshot(&self) {
        self.inner.lock().broadcast();
    }

    /// Change a device from the native side, then push.
    pub fn update_device(&self, id: &str, update: impl FnOnce(&mut AudioDeviceInfo)) -> bool {
        let mut state = self.inner.lock();
        match state.device_mut(id) {
            Some(device) => {
                update(device);
                state.broadcast();
                true
            }
            None => false,
        }
    }

    /// Unplug a device, then push.
    pub fn remove_device(&self, id: &str) {
        let mut state = self.inner.lock();
        state.snapshot.devices.retain(|d| d.id != id);
        state.broadcast();
    }
}

impl Transport for LoopbackBackend {
    fn subscribe(&self) -> BoxFuture<'_, Result<PushStream, TransportError>> {
        let mut state = self.inner.lock();
        state.calls.push(LoopbackCall::Subscribe);

        let result = if state.failing_subscribes > 0 {
            state.failing_subscribes -= 1;
            Err(TransportError::SubscriptionFailed(
                "loopback subscription refused".to_string(),
            ))
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            state.subscribers.push(tx);
            Ok(UnboundedReceiverStream::new(rx).boxed())
        };
        future::ready(result).boxed()
    }

    fn invoke(&self, query: Query) -> BoxFuture<'_, Result<(), TransportError>> {
        let mut state = self.inner.lock();
        state.calls.push(LoopbackCall::Invoke(query.clone()));

        let result = if state.fail_invokes {
            Err(TransportError::InvokeFailed(format!(
                "loopback refused {}",
                query.kind()
            )))
        } else {
            if state.apply(&query) {
                state.broadcast();
            } else {
                debug!("Loopback ignoring {} for unknown device", query.kind());
            }
            Ok(())
        };
        future::ready(result).boxed()
    }
}
