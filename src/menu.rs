// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Device picker entries for the right-click menu.
//!
//! Only the model lives here; whoever draws the menu maps entries to native
//! check items and feeds the picked action back in.

use crate::message::Intent;
use volmix_ipc::AudioSubsystemSnapshot;

pub const QUIT_LABEL: &str = "Quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    /// Make this device the default output.
    SelectDevice(String),
    Quit,
}

impl MenuAction {
    /// Intent to submit when this entry is picked. `Quit` has none; the
    /// caller decides how to tear down.
    pub fn into_intent(self) -> Option<Intent> {
        match self {
            MenuAction::SelectDevice(id) => Some(Intent::SetDefault { id }),
            MenuAction::Quit => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub label: String,
    /// `None` for plain items.
    pub checked: Option<bool>,
    pub action: MenuAction,
}

/// One check item per device, in backend order, with the default checked,
/// followed by Quit.
pub fn build_context_menu(snapshot: &AudioSubsystemSnapshot) -> Vec<MenuEntry> {
    let default_id = snapshot.default_device_id.as_deref();
    snapshot
        .devices
        .iter()
        .map(|device| MenuEntry {
            label: device.name.clone(),
            checked: Some(Some(device.id.as_str()) == default_id),
            action: MenuAction::SelectDevice(device.id.clone()),
        })
        .chain(std::iter::once(MenuEntry {
            label: QUIT_LABEL.to_string(),
            checked: None,
            action: MenuAction::Quit,
        }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use volmix_ipc::AudioDeviceInfo;

    #[test]
    fn test_default_is_checked() {
        let snapshot = AudioSubsystemSnapshot::new(
            vec![
                AudioDeviceInfo::new("a", "Speakers", 0.5, false),
                AudioDeviceInfo::new("b", "Headphones", 0.5, false),
            ],
            Some("b"),
        );
        let menu = build_context_menu(&snapshot);

        assert_eq!(menu.len(), 3);
        assert_eq!(menu[0].checked, Some(false));
        assert_eq!(menu[1].checked, Some(true));
        assert_eq!(menu[1].label, "Headphones");
        assert_eq!(menu[2].action, MenuAction::Quit);
        assert_eq!(menu[2].checked, None);
    }

    #[test]
    fn test_stale_default_checks_nothing() {
        let snapshot = AudioSubsystemSnapshot::new(
            vec![AudioDeviceInfo::new("a", "Speakers", 0.5, false)],
            Some("gone"),
        );
        let menu = build_context_menu(&snapshot);
        assert_eq!(menu[0].checked, Some(false));
    }

    #[test]
    fn test_select_maps_to_default_change() {
        let action = MenuAction::SelectDevice("b".to_string());
        assert_eq!(
            action.into_intent(),
            Some(Intent::SetDefault {
                id: "b".to_string()
            })
        );
        assert_eq!(MenuAction::Quit.into_intent(), None);
    }
}
