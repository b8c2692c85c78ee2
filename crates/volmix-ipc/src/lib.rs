// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Shared wire types for the VolMix audio backend boundary.
//!
//! This crate defines the push payload delivered on the `audio_state_change`
//! channel and the command queries the client sends back. Both travel as JSON
//! so the same types serve the D-Bus transport and any webview host.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;

/// Name of the push channel carrying full audio subsystem snapshots.
pub const AUDIO_STATE_CHANGE: &str = "audio_state_change";

/// D-Bus service name for the native audio backend.
pub const DBUS_NAME: &str = "com.volmix.AudioBackend";

/// D-Bus object path for the backend interface.
pub const DBUS_PATH: &str = "/com/volmix/AudioBackend";

/// D-Bus interface name.
pub const DBUS_INTERFACE: &str = "com.volmix.AudioBackend";

/// Information about a single audio endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    /// Opaque backend identifier.
    pub id: String,
    /// Human-readable device name.
    pub name: String,
    /// Linear volume, 0.0 to 1.0.
    pub volume: f32,
    /// Whether the endpoint is muted.
    pub muted: bool,
    /// Icon hint (if the backend provides one).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl AudioDeviceInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, volume: f32, muted: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            volume,
            muted,
            icon: None,
        }
    }
}

/// Complete state of the audio subsystem as seen by the backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioSubsystemSnapshot {
    /// Devices in backend order.
    #[serde(rename = "audioDeviceList")]
    pub devices: Vec<AudioDeviceInfo>,
    /// Current default endpoint. The backend sends an empty string for "none".
    #[serde(
        rename = "default",
        default,
        deserialize_with = "empty_as_none",
        serialize_with = "none_as_empty"
    )]
    pub default_device_id: Option<String>,
}

impl AudioSubsystemSnapshot {
    pub fn new(devices: Vec<AudioDeviceInfo>, default_device_id: Option<&str>) -> Self {
        Self {
            devices,
            default_device_id: default_device_id.map(str::to_string),
        }
    }

    /// Whether a device with this id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.devices.iter().any(|d| d.id == id)
    }

    /// Check the invariants a decoded push must satisfy.
    ///
    /// A default id that is not in the device list is allowed here; lookups
    /// simply resolve it to nothing.
    pub fn validate(&self) -> Result<(), PushError> {
        let mut seen = HashSet::with_capacity(self.devices.len());
        for device in &self.devices {
            if device.id.is_empty() {
                return Err(PushError::EmptyDeviceId);
            }
            if !seen.insert(device.id.as_str()) {
                return Err(PushError::DuplicateDevice(device.id.clone()));
            }
            if !device.volume.is_finite() || !(0.0..=1.0).contains(&device.volume) {
                return Err(PushError::InvalidVolume {
                    id: device.id.clone(),
                    volume: device.volume,
                });
            }
        }
        Ok(())
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

fn none_as_empty<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(value.as_deref().unwrap_or_default())
}

/// Payload of one `audio_state_change` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStateChangePayload {
    #[serde(rename = "windowsAudioState", alias = "audioState")]
    pub audio_state: AudioSubsystemSnapshot,
    /// Backend-side notification that triggered the push, passed through opaquely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<serde_json::Value>,
}

impl AudioStateChangePayload {
    pub fn new(audio_state: AudioSubsystemSnapshot) -> Self {
        Self {
            audio_state,
            notification: None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Decode and validate a raw push payload.
pub fn decode_push(raw: &str) -> Result<AudioStateChangePayload, PushError> {
    let payload: AudioStateChangePayload = serde_json::from_str(raw)?;
    payload.audio_state.validate()?;
    Ok(payload)
}

/// Command sent to the backend, tagged by `kind` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Query {
    /// Request a full snapshot push.
    AudioDict,
    /// Make the named device the default endpoint.
    DefaultAudioChange { id: String },
    /// Set a device's linear volume.
    VolumeChange { id: String, volume: f32 },
    /// Set a device's mute flag.
    MuteStateChange { id: String, muted: bool },
}

impl Query {
    /// Wire name of this query.
    pub fn kind(&self) -> &'static str {
        match self {
            Query::AudioDict => "AudioDict",
            Query::DefaultAudioChange { .. } => "DefaultAudioChange",
            Query::VolumeChange { .. } => "VolumeChange",
            Query::MuteStateChange { .. } => "MuteStateChange",
        }
    }

    /// Target device, if the query names one.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Query::AudioDict => None,
            Query::DefaultAudioChange { id }
            | Query::VolumeChange { id, .. }
            | Query::MuteStateChange { id, .. } => Some(id),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Reasons a push payload is rejected.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Malformed push payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Device with empty id")]
    EmptyDeviceId,
    #[error("Duplicate device id: {0}")]
    DuplicateDevice(String),
    #[error("Invalid volume {volume} for device {id}")]
    InvalidVolume { id: String, volume: f32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKEND_PUSH: &str = r#"{
        "windowsAudioState": {
            "audioDeviceList": [
                {"id": "{0.0.0}.{a}", "name": "Speakers", "volume": 0.5, "muted": false},
                {"id": "{0.0.0}.{b}", "name": "Headphones", "volume": 0.25, "muted": true}
            ],
            "default": "{0.0.0}.{a}"
        },
        "notification": null
    }"#;

    #[test]
    fn test_decode_backend_push() {
        let payload = decode_push(BACKEND_PUSH).unwrap();
        let state = payload.audio_state;
        assert_eq!(state.devices.len(), 2);
        assert_eq!(state.devices[1].name, "Headphones");
        assert!(state.devices[1].muted);
        assert_eq!(state.default_device_id.as_deref(), Some("{0.0.0}.{a}"));
        assert!(payload.notification.is_none());
    }

    #[test]
    fn test_empty_default_is_none() {
        let raw = r#"{"windowsAudioState": {"audioDeviceList": [], "default": ""}}"#;
        let payload = decode_push(raw).unwrap();
        assert_eq!(payload.audio_state.default_device_id, None);

        let json = payload.to_json().unwrap();
        assert!(json.contains(r#""default":"""#));
    }

    #[test]
    fn test_missing_device_list_rejected() {
        let raw = r#"{"windowsAudioState": {"default": "a"}}"#;
        assert!(matches!(decode_push(raw), Err(PushError::Malformed(_))));
    }

    #[test]
    fn test_missing_device_field_rejected() {
        let raw = r#"{"windowsAudioState": {"audioDeviceList": [{"id": "a", "name": "A", "muted": false}]}}"#;
        assert!(matches!(decode_push(raw), Err(PushError::Malformed(_))));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let snapshot = AudioSubsystemSnapshot::new(
            vec![
                AudioDeviceInfo::new("a", "A", 0.1, false),
                AudioDeviceInfo::new("a", "A again", 0.2, false),
            ],
            Some("a"),
        );
        assert!(matches!(snapshot.validate(), Err(PushError::DuplicateDevice(id)) if id == "a"));
    }

    #[test]
    fn test_out_of_range_volume_rejected() {
        let snapshot =
            AudioSubsystemSnapshot::new(vec![AudioDeviceInfo::new("a", "A", 1.5, false)], None);
        assert!(matches!(snapshot.validate(), Err(PushError::InvalidVolume { .. })));

        let snapshot =
            AudioSubsystemSnapshot::new(vec![AudioDeviceInfo::new("a", "A", f32::NAN, false)], None);
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_query_wire_format() {
        let query = Query::VolumeChange {
            id: "a".to_string(),
            volume: 0.5,
        };
        assert_eq!(query.to_json().unwrap(), r#"{"kind":"VolumeChange","id":"a","volume":0.5}"#);
        assert_eq!(Query::AudioDict.to_json().unwrap(), r#"{"kind":"AudioDict"}"#);
        assert_eq!(query.device_id(), Some("a"));
    }
}
