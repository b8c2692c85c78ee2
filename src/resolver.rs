// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Device lookups over a snapshot.

use std::fmt;
use std::str::FromStr;
use volmix_ipc::{AudioDeviceInfo, AudioSubsystemSnapshot};

/// Which device an intent or view refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceSelector {
    /// Whatever the backend currently reports as default.
    Default,
    /// A specific device id.
    Id(String),
}

impl FromStr for DeviceSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("default") {
            Ok(DeviceSelector::Default)
        } else {
            Ok(DeviceSelector::Id(s.to_string()))
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Default => write!(f, "default"),
            DeviceSelector::Id(id) => write!(f, "{}", id),
        }
    }
}

impl From<&str> for DeviceSelector {
    fn from(id: &str) -> Self {
        DeviceSelector::Id(id.to_string())
    }
}

impl From<String> for DeviceSelector {
    fn from(id: String) -> Self {
        DeviceSelector::Id(id)
    }
}

/// The device named by `default_device_id`.
///
/// Returns `None` when no default is set or the default id is not in the
/// device list.
pub fn default_device(snapshot: &AudioSubsystemSnapshot) -> Option<&AudioDeviceInfo> {
    let id = snapshot.default_device_id.as_deref()?;
    by_id(snapshot, id)
}

pub fn by_id<'a>(snapshot: &'a AudioSubsystemSnapshot, id: &str) -> Option<&'a AudioDeviceInfo> {
    snapshot.devices.iter().find(|d| d.id == id)
}

pub fn resolve<'a>(
    snapshot: &'a AudioSubsystemSnapshot,
    selector: &DeviceSelector,
) -> Option<&'a AudioDeviceInfo> {
    match selector {
        DeviceSelector::Default => default_device(snapshot),
        DeviceSelector::Id(id) => by_id(snapshot, id),
    }
}
