// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Application configuration (timing, input, transport).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Debounce delays per input modality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Slider drag and wheel ticks.
    pub continuous_ms: u64,
    /// Toggles, slider release, menu picks.
    pub discrete_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            continuous_ms: 10,
            discrete_ms: 50,
        }
    }
}

impl DebounceConfig {
    pub fn continuous(&self) -> Duration {
        Duration::from_millis(self.continuous_ms)
    }

    pub fn discrete(&self) -> Duration {
        Duration::from_millis(self.discrete_ms)
    }
}

/// Input handling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Volume change per wheel tick (also the slider step).
    pub volume_step: f32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { volume_step: 0.01 }
    }
}

/// Push channel subscription settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Total subscribe attempts before giving up.
    pub subscribe_attempts: u32,
    /// Delay after the first failed attempt; doubles each retry.
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            subscribe_attempts: 3,
            retry_backoff_ms: 250,
            max_backoff_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Backend service on the session bus.
    #[default]
    Dbus,
    /// In-process simulated backend.
    Loopback,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub debounce: DebounceConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

impl AppConfig {
    /// Load config from TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Check values serde cannot: the wheel step must be a finite,
    /// non-negative fraction of full volume.
    pub fn validate(&self) -> Result<(), String> {
        let step = self.input.volume_step;
        if !step.is_finite() || !(0.0..=1.0).contains(&step) {
            return Err(format!("input.volume_step must be within 0.0-1.0, got {}", step));
        }
        Ok(())
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.debounce.continuous(), Duration::from_millis(10));
        assert_eq!(config.debounce.discrete(), Duration::from_millis(50));
        assert_eq!(config.transport.kind, TransportKind::Dbus);
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
            [debounce]
            continuous_ms = 16
            discrete_ms = 80

            [transport]
            kind = "loopback"
            "#,
        )
        .unwrap();
        assert_eq!(config.debounce.continuous_ms, 16);
        assert_eq!(config.transport.kind, TransportKind::Loopback);
        assert_eq!(config.bridge, BridgeConfig::default());
    }

    #[test]
    fn test_volume_step_validation() {
        assert!(AppConfig::default().validate().is_ok());

        for raw in ["nan", "-0.01", "inf", "2.0"] {
            let config = AppConfig::from_toml(&format!("[input]\nvolume_step = {}\n", raw)).unwrap();
            assert!(config.validate().is_err(), "volume_step = {} accepted", raw);
        }
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = AppConfig::default();
        config.input.volume_step = 0.05;
        let parsed = AppConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
