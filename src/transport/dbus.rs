// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! D-Bus transport to the native audio backend service.

use super::{PushStream, Transport, TransportError};
use futures::future::{BoxFuture, FutureExt};
use futures::StreamExt;
use tracing::{debug, info, warn};
use volmix_ipc::{Query, AUDIO_STATE_CHANGE, DBUS_INTERFACE, DBUS_NAME, DBUS_PATH};
use zbus::{proxy, Connection, Result as ZbusResult};

/// D-Bus proxy for the backend interface.
#[proxy(
    interface = "com.volmix.AudioBackend",
    default_service = "com.volmix.AudioBackend",
    default_path = "/com/volmix/AudioBackend"
)]
trait AudioBackend {
    /// Submit a JSON-encoded `Query`.
    fn query(&self, query: &str) -> ZbusResult<()>;

    /// Full snapshot push, JSON-encoded `AudioStateChangePayload`.
    #[zbus(signal)]
    fn audio_state_change(&self, payload: &str) -> ZbusResult<()>;
}

/// Transport backed by the session bus.
pub struct DbusTransport {
    proxy: AudioBackendProxy<'static>,
}

impl DbusTransport {
    /// Connect to the backend service on the session bus.
    pub async fn connect() -> Result<Self, TransportError> {
        info!("Connecting to {}...", DBUS_NAME);

        let connection = Connection::session().await.map_err(connection_failed)?;

        let proxy = AudioBackendProxy::builder(&connection)
            .destination(DBUS_NAME)
            .and_then(|builder| builder.path(DBUS_PATH))
            .and_then(|builder| builder.interface(DBUS_INTERFACE))
            .map_err(connection_failed)?
            .build()
            .await
            .map_err(connection_failed)?;

        Ok(Self { proxy })
    }
}

fn connection_failed(e: zbus::Error) -> TransportError {
    TransportError::ConnectionFailed(e.to_string())
}

impl Transport for DbusTransport {
    fn subscribe(&self) -> BoxFuture<'_, Result<PushStream, TransportError>> {
        async move {
            let signals = self
                .proxy
                .receive_audio_state_change()
                .await
                .map_err(|e| TransportError::SubscriptionFailed(e.to_string()))?;
            debug!("Subscribed to {}", AUDIO_STATE_CHANGE);

            let pushes = signals.filter_map(|signal| async move {
                match signal.args() {
                    Ok(args) => Some(args.payload.to_string()),
                    Err(e) => {
                        warn!("Unreadable {} signal: {}", AUDIO_STATE_CHANGE, e);
                        None
                    }
                }
            });
            Ok(pushes.boxed())
        }
        .boxed()
    }

    fn invoke(&self, query: Query) -> BoxFuture<'_, Result<(), TransportError>> {
        async move {
            let json = query
                .to_json()
                .map_err(|e| TransportError::Encode(e.to_string()))?;
            self.proxy
                .query(&json)
                .await
                .map_err(|e| TransportError::InvokeFailed(e.to_string()))
        }
        .boxed()
    }
}
