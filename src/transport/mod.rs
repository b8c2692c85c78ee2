// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Boundary to the native audio backend.
//!
//! A transport delivers `audio_state_change` pushes as raw JSON and carries
//! command queries the other way. Everything above this module is
//! transport-agnostic.

pub mod dbus;
pub mod loopback;

pub use dbus::DbusTransport;
pub use loopback::{LoopbackBackend, LoopbackCall};

use crate::config::TransportKind;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::sync::Arc;
use volmix_ipc::Query;

/// Stream of raw push payloads, in delivery order.
pub type PushStream = BoxStream<'static, String>;

/// Connection to the audio backend.
pub trait Transport: Send + Sync {
    /// Start receiving pushes. Pushes that arrive after this resolves are
    /// buffered in the returned stream until read.
    fn subscribe(&self) -> BoxFuture<'_, Result<PushStream, TransportError>>;

    /// Send one command. Resolves once the backend accepted the request.
    fn invoke(&self, query: Query) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Errors that can occur when talking to the backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to backend: {0}")]
    ConnectionFailed(String),
    #[error("Push subscription failed: {0}")]
    SubscriptionFailed(String),
    #[error("Command failed: {0}")]
    InvokeFailed(String),
    #[error("Failed to encode command: {0}")]
    Encode(String),
}

/// Open the transport selected in the config.
pub async fn connect(kind: TransportKind) -> Result<Arc<dyn Transport>, TransportError> {
    match kind {
        TransportKind::Dbus => Ok(Arc::new(DbusTransport::connect().await?)),
        TransportKind::Loopback => Ok(Arc::new(LoopbackBackend::demo())),
    }
}
