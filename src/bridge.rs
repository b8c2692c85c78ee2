// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Event bridge between the backend transport and the core.
//!
//! Subscribes to the push channel, then asks for a full dump. From then on a
//! single pump task feeds pushes and UI intents into the core in arrival
//! order.

use crate::config::AppConfig;
use crate::message::Intent;
use crate::mixer::MixerCore;
use crate::transport::{PushStream, Transport, TransportError};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use volmix_ipc::Query;

/// Lifecycle of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Subscribing,
    /// Subscribed; no snapshot applied yet.
    AwaitingInitialDump,
    Live,
    /// Subscribing gave up. Terminal.
    Failed,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Subscribing to audio state failed after {attempts} attempts: {source}")]
    SubscribeFailed {
        attempts: u32,
        source: TransportError,
    },
    #[error("Bridge pump has stopped")]
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    pub subscribe_attempts: u32,
    pub retry_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for BridgeSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            subscribe_attempts: config.bridge.subscribe_attempts,
            retry_backoff: Duration::from_millis(config.bridge.retry_backoff_ms),
            max_backoff: Duration::from_millis(config.bridge.max_backoff_ms),
        }
    }
}

/// Owns the subscription for one core. Consumed by [`EventBridge::start`].
///
/// Subscribes over the core's own transport, so pushes and commands always
/// travel the same connection.
pub struct EventBridge {
    transport: Arc<dyn Transport>,
    core: MixerCore,
    settings: BridgeSettings,
    state: watch::Sender<BridgeState>,
}

impl EventBridge {
    pub fn new(core: MixerCore, settings: BridgeSettings) -> Self {
        let (state, _) = watch::channel(BridgeState::Uninitialized);
        Self {
            transport: core.transport(),
            core,
            settings,
            state,
        }
    }

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    /// Subscribe, spawn the pump, then request the initial dump.
    ///
    /// A failed dump request is not fatal: the next push from the backend
    /// brings the bridge live just the same.
    pub async fn start(self) -> Result<BridgeHandle, BridgeError> {
        self.state.send_replace(BridgeState::Subscribing);
        let pushes = match self.subscribe_with_retry().await {
            Ok(pushes) => pushes,
            Err(e) => {
                error!("{}", e);
                self.state.send_replace(BridgeState::Failed);
                return Err(e);
            }
        };
        self.state.send_replace(BridgeState::AwaitingInitialDump);

        let Self {
            transport,
            core,
            state,
            ..
        } = self;
        let (intents, intent_rx) = mpsc::unbounded_channel();
        let state_rx = state.subscribe();
        let pump = tokio::spawn(run_pump(core.clone(), pushes, intent_rx, state));

        if let Err(e) = transport.invoke(Query::AudioDict).await {
            warn!("Initial audio state request failed: {}", e);
        }

        Ok(BridgeHandle {
            core,
            intents,
            state: state_rx,
            pump,
        })
    }

    async fn subscribe_with_retry(&self) -> Result<PushStream, BridgeError> {
        let attempts = self.settings.subscribe_attempts.max(1);
        let max_backoff = self.settings.max_backoff;
        let mut backoff = self.settings.retry_backoff.min(max_backoff);
        let mut attempt = 1;
        loop {
            match self.transport.subscribe().await {
                Ok(pushes) => {
                    info!("Subscribed to audio state changes");
                    return Ok(pushes);
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        "Subscribe attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, attempts, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff, max_backoff);
                    attempt += 1;
                }
                Err(source) => return Err(BridgeError::SubscribeFailed { attempts, source }),
            }
        }
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

async fn run_pump(
    core: MixerCore,
    mut pushes: PushStream,
    mut intents: mpsc::UnboundedReceiver<Intent>,
    state: watch::Sender<BridgeState>,
) {
    let mut live = false;
    let mut pushes_open = true;
    let mut intents_open = true;

    loop {
        tokio::select! {
            raw = pushes.next(), if pushes_open => match raw {
                Some(raw) => {
                    if core.apply_push(&raw).is_ok() && !live {
                        live = true;
                        state.send_replace(BridgeState::Live);
                        info!("Audio state bridge live");
                    }
                }
                None => {
                    warn!("Audio state push channel closed");
                    pushes_open = false;
                }
            },
            intent = intents.recv(), if intents_open => match intent {
                Some(intent) => {
                    if let Err(e) = core.handle_intent(intent) {
                        warn!("Ignoring intent: {}", e);
                    }
                }
                None => {
                    debug!("Intent channel closed");
                    intents_open = false;
                }
            },
            else => break,
        }
    }
}

/// Running bridge. Dropping it closes the intent channel; pushes keep
/// flowing into the core.
pub struct BridgeHandle {
    core: MixerCore,
    intents: mpsc::UnboundedSender<Intent>,
    state: watch::Receiver<BridgeState>,
    pump: JoinHandle<()>,
}

impl BridgeHandle {
    pub fn core(&self) -> &MixerCore {
        &self.core
    }

    /// Queue an intent for the pump.
    pub fn send(&self, intent: Intent) -> Result<(), BridgeError> {
        self.intents.send(intent).map_err(|_| BridgeError::Closed)
    }

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<BridgeState> {
        self.state.clone()
    }

    /// Resolve once the first snapshot has been applied.
    pub async fn wait_live(&self) -> Result<(), BridgeError> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == BridgeState::Live)
            .await
            .map(|_| ())
            .map_err(|_| BridgeError::Closed)
    }

    pub fn is_running(&self) -> bool {
        !self.pump.is_finished()
    }
}
