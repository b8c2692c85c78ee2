// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! What the meter widget renders for one device.

use crate::overlay::OptimisticOverlay;
use volmix_ipc::AudioDeviceInfo;

/// Speaker glyph variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeIcon {
    Muted,
    Silent,
    Audible,
}

/// Display state of one device, overlay applied.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceView {
    pub id: String,
    pub name: String,
    pub icon_hint: Option<String>,
    pub volume: f32,
    pub muted: bool,
    /// The slider is presented disabled while muted; edits still apply.
    pub volume_enabled: bool,
    pub is_default: bool,
}

impl DeviceView {
    pub fn compose(device: &AudioDeviceInfo, overlay: &OptimisticOverlay, is_default: bool) -> Self {
        let volume = overlay.display_volume(&device.id, Some(device));
        let muted = overlay.display_muted(&device.id, Some(device));
        Self {
            id: device.id.clone(),
            name: device.name.clone(),
            icon_hint: device.icon.clone(),
            volume,
            muted,
            volume_enabled: !muted,
            is_default,
        }
    }

    pub fn icon(&self) -> VolumeIcon {
        if self.muted {
            VolumeIcon::Muted
        } else if self.volume == 0.0 {
            VolumeIcon::Silent
        } else {
            VolumeIcon::Audible
        }
    }

    /// Volume as shown next to the slider.
    pub fn percent(&self) -> u8 {
        (self.volume.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::LocalValue;

    #[test]
    fn test_compose_uses_overlay() {
        let mut overlay = OptimisticOverlay::new();
        let device = AudioDeviceInfo::new("a", "Speakers", 0.5, false);
        overlay.set_local("a", LocalValue::Muted(true));

        let view = DeviceView::compose(&device, &overlay, true);
        assert!(view.muted);
        assert!(!view.volume_enabled);
        assert_eq!(view.icon(), VolumeIcon::Muted);
        assert_eq!(view.percent(), 50);
    }

    #[test]
    fn test_icon_and_percent() {
        let overlay = OptimisticOverlay::new();
        let silent = DeviceView::compose(&AudioDeviceInfo::new("a", "A", 0.0, false), &overlay, false);
        assert_eq!(silent.icon(), VolumeIcon::Silent);
        assert!(silent.volume_enabled);

        let loud = DeviceView::compose(&AudioDeviceInfo::new("b", "B", 0.666, false), &overlay, false);
        assert_eq!(loud.icon(), VolumeIcon::Audible);
        assert_eq!(loud.percent(), 67);
    }
}
