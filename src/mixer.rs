// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The assembled sync core: mirror, overlay and debouncer behind one handle.
//!
//! Mirror and overlay share a lock so that applying a snapshot and
//! reconciling the overlay against it happen in one step. When both locks are
//! needed the state lock is taken first, then the debouncer's table.

use crate::config::AppConfig;
use crate::debounce::{CommandDebouncer, CommandKey};
use crate::menu::{build_context_menu, MenuEntry};
use crate::message::{CoreEvent, Gesture, Intent};
use crate::overlay::{LocalValue, OptimisticOverlay};
use crate::resolver::{self, DeviceSelector};
use crate::state::StateMirror;
use crate::transport::Transport;
use crate::view::DeviceView;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use volmix_ipc::{AudioDeviceInfo, AudioSubsystemSnapshot, PushError, Query};

const EVENT_CAPACITY: usize = 64;

/// Reasons an intent is refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("No audio state received yet")]
    NotReady,
    #[error("Unknown device: {0}")]
    UnknownDevice(String),
    #[error("Invalid volume: {0}")]
    InvalidVolume(f32),
}

/// Timing and input parameters of the core.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreSettings {
    pub continuous_delay: Duration,
    pub discrete_delay: Duration,
    pub volume_step: f32,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CoreSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            continuous_delay: config.debounce.continuous(),
            discrete_delay: config.debounce.discrete(),
            volume_step: config.input.volume_step,
        }
    }
}

impl CoreSettings {
    fn delay_for(&self, gesture: Gesture) -> Duration {
        match gesture {
            Gesture::Continuous => self.continuous_delay,
            Gesture::Discrete => self.discrete_delay,
        }
    }
}

#[derive(Default)]
struct CoreState {
    mirror: StateMirror,
    overlay: OptimisticOverlay,
}

struct Inner {
    state: Mutex<CoreState>,
    transport: Arc<dyn Transport>,
    debouncer: CommandDebouncer,
    events: broadcast::Sender<CoreEvent>,
    settings: CoreSettings,
}

/// Shared handle to the sync core. Cheap to clone.
#[derive(Clone)]
pub struct MixerCore {
    inner: Arc<Inner>,
}

impl MixerCore {
    pub fn new(transport: Arc<dyn Transport>, settings: CoreSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CoreState::default()),
                debouncer: CommandDebouncer::new(Arc::clone(&transport), events.clone()),
                transport,
                events,
                settings,
            }),
        }
    }

    /// The backend connection commands are sent over. The event bridge
    /// subscribes through the same one.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.transport)
    }

    // ==================== Pushes ====================

    /// Decode a raw push, replace the mirrored snapshot and drop overlay
    /// entries for every device it lists.
    pub fn apply_push(&self, raw: &str) -> Result<Arc<AudioSubsystemSnapshot>, PushError> {
        let result = {
            let mut state = self.inner.state.lock();
            state.mirror.apply_push(raw).map(|snapshot| {
                let dropped = state.overlay.reconcile(&snapshot);
                (snapshot, state.mirror.generation(), dropped)
            })
        };
        self.after_apply(result)
    }

    /// Replace the mirrored snapshot with an already decoded one.
    pub fn apply_snapshot(
        &self,
        snapshot: AudioSubsystemSnapshot,
    ) -> Result<Arc<AudioSubsystemSnapshot>, PushError> {
        let result = snapshot.validate().map(|()| {
            let mut state = self.inner.state.lock();
            let snapshot = state.mirror.apply(snapshot);
            let dropped = state.overlay.reconcile(&snapshot);
            (snapshot, state.mirror.generation(), dropped)
        });
        self.after_apply(result)
    }

    fn after_apply(
        &self,
        result: Result<(Arc<AudioSubsystemSnapshot>, u64, usize), PushError>,
    ) -> Result<Arc<AudioSubsystemSnapshot>, PushError> {
        match result {
            Ok((snapshot, generation, dropped)) => {
                if dropped > 0 {
                    debug!("Push superseded {} local edits", dropped);
                }
                self.emit(CoreEvent::SnapshotApplied {
                    generation,
                    devices: snapshot.devices.len(),
                    default_device_id: snapshot.default_device_id.clone(),
                });
                Ok(snapshot)
            }
            Err(e) => {
                self.emit(CoreEvent::PushRejected(e.to_string()));
                Err(e)
            }
        }
    }

    // ==================== Intents ====================

    /// Apply a user intent: update the overlay now, send the command later.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn handle_intent(&self, intent: Intent) -> Result<(), CoreError> {
        trace!("Intent: {:?}", intent);
        match intent {
            Intent::SetVolume {
                device,
                volume,
                gesture,
            } => {
                if volume.is_nan() {
                    return Err(CoreError::InvalidVolume(volume));
                }
                let delay = self.inner.settings.delay_for(gesture);
                self.with_device(&device, |state, target| {
                    self.set_volume(state, &target.id, volume, delay);
                })
            }

            Intent::Wheel {
                device,
                delta_x,
                delta_y,
            } => {
                let delta = if delta_y != 0.0 { delta_y } else { delta_x };
                if delta == 0.0 || delta.is_nan() {
                    return Ok(());
                }
                let step = self.inner.settings.volume_step;
                let delay = self.inner.settings.continuous_delay;
                self.with_device(&device, |state, target| {
                    let current = state.overlay.display_volume(&target.id, Some(target));
                    // Scrolling down (positive delta) turns the volume down.
                    let volume = if delta > 0.0 { current - step } else { current + step };
                    if !volume.is_finite() {
                        warn!("Ignoring wheel tick: volume step {} gives {}", step, volume);
                        return;
                    }
                    self.set_volume(state, &target.id, volume, delay);
                })
            }

            Intent::ToggleMute { device } => self.with_device(&device, |state, target| {
                let muted = !state.overlay.display_muted(&target.id, Some(target));
                self.set_muted(state, &target.id, muted);
            }),

            Intent::SetMute { device, muted } => self.with_device(&device, |state, target| {
                self.set_muted(state, &target.id, muted);
            }),

            Intent::SetDefault { id } => {
                let snapshot = self.snapshot().ok_or(CoreError::NotReady)?;
                if !snapshot.contains(&id) {
                    return Err(CoreError::UnknownDevice(id));
                }
                self.inner.debouncer.schedule(
                    CommandKey::default_device(),
                    Query::DefaultAudioChange { id },
                    self.inner.settings.discrete_delay,
                );
                Ok(())
            }
        }
    }

    fn with_device(
        &self,
        selector: &DeviceSelector,
        f: impl FnOnce(&mut CoreState, &AudioDeviceInfo),
    ) -> Result<(), CoreError> {
        let mut state = self.inner.state.lock();
        let snapshot = state.mirror.current().ok_or(CoreError::NotReady)?;
        let device = resolver::resolve(&snapshot, selector)
            .ok_or_else(|| CoreError::UnknownDevice(selector.to_string()))?;
        f(&mut *state, device);
        Ok(())
    }

    fn set_volume(&self, state: &mut CoreState, id: &str, volume: f32, delay: Duration) {
        let volume = volume.clamp(0.0, 1.0);
        state.overlay.set_local(id, LocalValue::Volume(volume));
        self.inner.debouncer.schedule(
            CommandKey::volume(id),
            Query::VolumeChange {
                id: id.to_string(),
                volume,
            },
            delay,
        );
    }

    fn set_muted(&self, state: &mut CoreState, id: &str, muted: bool) {
        state.overlay.set_local(id, LocalValue::Muted(muted));
        self.inner.debouncer.schedule(
            CommandKey::mute(id),
            Query::MuteStateChange {
                id: id.to_string(),
                muted,
            },
            self.inner.settings.discrete_delay,
        );
    }

    // ==================== Views ====================

    /// Latest mirrored snapshot, without overlay.
    pub fn snapshot(&self) -> Option<Arc<AudioSubsystemSnapshot>> {
        self.inner.state.lock().mirror.current()
    }

    pub fn generation(&self) -> u64 {
        self.inner.state.lock().mirror.generation()
    }

    pub fn device_view(&self, selector: &DeviceSelector) -> Option<DeviceView> {
        let state = self.inner.state.lock();
        let snapshot = state.mirror.current()?;
        let device = resolver::resolve(&snapshot, selector)?;
        Some(compose(&snapshot, device, &state.overlay))
    }

    /// The meter's primary view: the default device.
    pub fn default_view(&self) -> Option<DeviceView> {
        self.device_view(&DeviceSelector::Default)
    }

    /// Every device in backend order.
    pub fn devices(&self) -> Vec<DeviceView> {
        let state = self.inner.state.lock();
        let Some(snapshot) = state.mirror.current() else {
            return Vec::new();
        };
        snapshot
            .devices
            .iter()
            .map(|device| compose(&snapshot, device, &state.overlay))
            .collect()
    }

    /// Device picker. Before the first push only Quit is offered.
    pub fn context_menu(&self) -> Vec<MenuEntry> {
        match self.snapshot() {
            Some(snapshot) => build_context_menu(&snapshot),
            None => build_context_menu(&AudioSubsystemSnapshot::default()),
        }
    }

    /// Number of local edits not yet confirmed by a push.
    pub fn optimistic_count(&self) -> usize {
        self.inner.state.lock().overlay.len()
    }

    // ==================== Lifecycle ====================

    pub fn subscribe_events(&self) -> broadcast::Receiver<CoreEvent> {
        self.inner.events.subscribe()
    }

    pub fn debouncer(&self) -> &CommandDebouncer {
        &self.inner.debouncer
    }

    /// Resolve once every scheduled command has been sent.
    pub async fn wait_idle(&self) {
        self.inner.debouncer.wait_idle().await
    }

    /// Drop pending commands. Returns how many were dropped.
    pub fn shutdown(&self) -> usize {
        self.inner.debouncer.cancel_all()
    }

    fn emit(&self, event: CoreEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }
}

fn compose(
    snapshot: &AudioSubsystemSnapshot,
    device: &AudioDeviceInfo,
    overlay: &OptimisticOverlay,
) -> DeviceView {
    let is_default = snapshot.default_device_id.as_deref() == Some(device.id.as_str());
    DeviceView::compose(device, overlay, is_default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackBackend;

    const SPEAKERS: &str = "loopback-speakers";
    const HEADPHONES: &str = "loopback-headphones";

    fn setup() -> (LoopbackBackend, MixerCore) {
        let backend = LoopbackBackend::demo();
        let core = MixerCore::new(Arc::new(backend.clone()), CoreSettings::default());
        core.apply_snapshot(backend.snapshot()).unwrap();
        (backend, core)
    }

    fn single(id: &str, volume: f32, muted: bool) -> AudioSubsystemSnapshot {
        AudioSubsystemSnapshot::new(vec![AudioDeviceInfo::new(id, "Device", volume, muted)], Some(id))
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[tokio::test(start_paused = true)]
    async fn test_drag_then_confirming_push() {
        let backend = LoopbackBackend::new(single("A", 0.5, false));
        let core = MixerCore::new(Arc::new(backend.clone()), CoreSettings::default());

        core.apply_snapshot(single("A", 0.5, false)).unwrap();
        let view = core.default_view().unwrap();
        assert_eq!(view.id, "A");
        assert_eq!(view.volume, 0.5);

        for i in 0..10 {
            let volume = (71 + i) as f32 / 100.0;
            core.handle_intent(Intent::set_volume("A", volume, Gesture::Continuous))
                .unwrap();
            tokio::time::advance(Duration::from_micros(500)).await;
        }
        core.wait_idle().await;

        assert_eq!(
            backend.invoked(),
            vec![Query::VolumeChange {
                id: "A".to_string(),
                volume: 0.8
            }]
        );
        assert_eq!(core.default_view().unwrap().volume, 0.8);

        core.apply_snapshot(single("A", 0.8, false)).unwrap();
        assert_eq!(core.default_view().unwrap().volume, 0.8);
        assert_eq!(core.optimistic_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_overrides_local_edit() {
        let (_backend, core) = setup();
        core.handle_intent(Intent::set_volume(SPEAKERS, 0.7, Gesture::Discrete))
            .unwrap();
        assert_eq!(core.device_view(&SPEAKERS.into()).unwrap().volume, 0.7);

        let mut snapshot = core.snapshot().unwrap().as_ref().clone();
        snapshot.devices[0].volume = 0.4;
        core.apply_snapshot(snapshot).unwrap();

        assert_eq!(core.device_view(&SPEAKERS.into()).unwrap().volume, 0.4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_edit_while_muted() {
        let (_backend, core) = setup();
        core.handle_intent(Intent::SetMute {
            device: SPEAKERS.into(),
            muted: true,
        })
        .unwrap();
        core.handle_intent(Intent::set_volume(SPEAKERS, 0.2, Gesture::Continuous))
            .unwrap();

        let view = core.device_view(&SPEAKERS.into()).unwrap();
        assert_eq!(view.volume, 0.2);
        assert!(view.muted);
        assert!(!view.volume_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wheel_steps_and_direction() {
        let (backend, core) = setup();

        core.handle_intent(Intent::wheel(DeviceSelector::Default, 120.0)).unwrap();
        core.handle_intent(Intent::wheel(DeviceSelector::Default, 120.0)).unwrap();
        assert!(approx(core.default_view().unwrap().volume, 0.48));

        core.handle_intent(Intent::Wheel {
            device: DeviceSelector::Default,
            delta_x: -1.0,
            delta_y: 0.0,
        })
        .unwrap();
        assert!(approx(core.default_view().unwrap().volume, 0.49));

        core.wait_idle().await;
        let invoked = backend.invoked();
        assert_eq!(invoked.len(), 1);
        match &invoked[0] {
            Query::VolumeChange { id, volume } => {
                assert_eq!(id, SPEAKERS);
                assert!(approx(*volume, 0.49));
            }
            other => panic!("Expected VolumeChange, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wheel_zero_delta_ignored() {
        let (_backend, core) = setup();
        core.handle_intent(Intent::wheel(SPEAKERS, 0.0)).unwrap();
        assert_eq!(core.debouncer().pending_count(), 0);
        assert_eq!(core.optimistic_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wheel_with_nan_step_sends_nothing() {
        let backend = LoopbackBackend::demo();
        let settings = CoreSettings {
            volume_step: f32::NAN,
            ..CoreSettings::default()
        };
        let core = MixerCore::new(Arc::new(backend.clone()), settings);
        core.apply_snapshot(backend.snapshot()).unwrap();

        core.handle_intent(Intent::wheel(SPEAKERS, 1.0)).unwrap();
        assert_eq!(core.debouncer().pending_count(), 0);
        assert_eq!(core.optimistic_count(), 0);
        assert_eq!(core.device_view(&SPEAKERS.into()).unwrap().volume, 0.5);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(backend.invoked().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wheel_clamps_at_bounds() {
        let backend = LoopbackBackend::new(single("A", 0.0, false));
        let core = MixerCore::new(Arc::new(backend), CoreSettings::default());
        core.apply_snapshot(single("A", 0.0, false)).unwrap();

        core.handle_intent(Intent::wheel("A", 1.0)).unwrap();
        assert_eq!(core.default_view().unwrap().volume, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_clamped_and_nan_rejected() {
        let (_backend, core) = setup();
        core.handle_intent(Intent::set_volume(SPEAKERS, 1.5, Gesture::Discrete))
            .unwrap();
        assert_eq!(core.device_view(&SPEAKERS.into()).unwrap().volume, 1.0);

        assert!(matches!(
            core.handle_intent(Intent::set_volume(SPEAKERS, f32::NAN, Gesture::Discrete)),
            Err(CoreError::InvalidVolume(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_mute_twice_sends_final_state() {
        let (backend, core) = setup();

        core.handle_intent(Intent::toggle_mute(SPEAKERS)).unwrap();
        assert!(core.device_view(&SPEAKERS.into()).unwrap().muted);
        core.handle_intent(Intent::toggle_mute(SPEAKERS)).unwrap();
        assert!(!core.device_view(&SPEAKERS.into()).unwrap().muted);

        core.wait_idle().await;
        assert_eq!(
            backend.invoked(),
            vec![Query::MuteStateChange {
                id: SPEAKERS.to_string(),
                muted: false
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_selection_coalesces() {
        let (backend, core) = setup();

        core.handle_intent(Intent::SetDefault {
            id: HEADPHONES.to_string(),
        })
        .unwrap();
        core.handle_intent(Intent::SetDefault {
            id: SPEAKERS.to_string(),
        })
        .unwrap();
        core.wait_idle().await;

        assert_eq!(
            backend.invoked(),
            vec![Query::DefaultAudioChange {
                id: SPEAKERS.to_string()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_device_and_not_ready() {
        let backend = LoopbackBackend::demo();
        let core = MixerCore::new(Arc::new(backend), CoreSettings::default());
        assert_eq!(
            core.handle_intent(Intent::toggle_mute(SPEAKERS)),
            Err(CoreError::NotReady)
        );
        assert!(core.default_view().is_none());
        assert_eq!(core.context_menu().len(), 1);

        core.apply_snapshot(single("A", 0.5, false)).unwrap();
        assert_eq!(
            core.handle_intent(Intent::toggle_mute("nope")),
            Err(CoreError::UnknownDevice("nope".to_string()))
        );
        assert_eq!(
            core.handle_intent(Intent::SetDefault {
                id: "nope".to_string()
            }),
            Err(CoreError::UnknownDevice("nope".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_default_resolves_to_none() {
        let (_backend, core) = setup();
        let mut snapshot = core.snapshot().unwrap().as_ref().clone();
        snapshot.default_device_id = Some("unplugged".to_string());
        core.apply_snapshot(snapshot).unwrap();

        assert!(core.default_view().is_none());
        assert_eq!(
            core.handle_intent(Intent::toggle_mute(DeviceSelector::Default)),
            Err(CoreError::UnknownDevice("default".to_string()))
        );
        assert_eq!(core.devices().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_push_keeps_snapshot_and_reports() {
        let (_backend, core) = setup();
        let mut events = core.subscribe_events();
        let before = core.generation();

        assert!(core.apply_push("{\"windowsAudioState\": 3}").is_err());
        assert_eq!(core.generation(), before);
        assert_eq!(core.devices().len(), 2);
        assert!(matches!(events.recv().await.unwrap(), CoreEvent::PushRejected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_for_removed_device_keeps_its_edit() {
        let (_backend, core) = setup();
        core.handle_intent(Intent::set_volume(HEADPHONES, 0.9, Gesture::Discrete))
            .unwrap();

        core.apply_snapshot(single(SPEAKERS, 0.5, false)).unwrap();
        assert_eq!(core.optimistic_count(), 1);
        assert!(core.device_view(&HEADPHONES.into()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending() {
        let (backend, core) = setup();
        core.handle_intent(Intent::toggle_mute(SPEAKERS)).unwrap();
        assert_eq!(core.shutdown(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(backend.invoked().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_menu_reflects_default() {
        let (_backend, core) = setup();
        let menu = core.context_menu();
        assert_eq!(menu.len(), 3);
        assert_eq!(menu[0].checked, Some(true));
        assert_eq!(menu[1].checked, Some(false));
    }
}
