//! Application settings

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use dropbot_monitor::MonitorConfig;
use dropbot_sim::SimulatedDeviceConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Simulated hardware the console runs against
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationSettings {
    /// Port the simulated board appears on
    pub port: String,
    /// Hardware conditions (power, firmware, chip)
    pub device: SimulatedDeviceConfig,
    /// How long a simulated flash takes in milliseconds
    pub flash_ms: u64,
    /// Interval between simulated capacitance readings in milliseconds
    pub telemetry_ms: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            port: "COM3".to_string(),
            device: SimulatedDeviceConfig::default(),
            flash_ms: 3000,
            telemetry_ms: 50,
        }
    }
}

impl SimulationSettings {
    pub fn flash_duration(&self) -> Duration {
        Duration::from_millis(self.flash_ms)
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_ms.max(1))
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Monitor timing and identity
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Simulated hardware
    #[serde(default)]
    pub simulation: SimulationSettings,
    /// Minimum time between logged capacitance readings in milliseconds
    #[serde(default = "default_capacitance_log_ms")]
    pub capacitance_log_ms: u64,
}

fn default_capacitance_log_ms() -> u64 {
    250
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            simulation: SimulationSettings::default(),
            capacitance_log_ms: default_capacitance_log_ms(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for dropbot
    /// Uses $XDG_CONFIG_HOME/dropbot on Linux/macOS, falls back to ~/.config/dropbot
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("dropbot"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("dropbot"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };
        let Ok(json) = std::fs::read_to_string(&path) else {
            return Self::default();
        };

        match serde_json::from_str(&json) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring unreadable settings in {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save settings to disk
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = Self::settings_path().context("could not determine settings path")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("failed to create settings directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("failed to serialize settings")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;

        Ok(path)
    }

    /// Minimum time between logged capacitance readings
    pub fn capacitance_log_interval(&self) -> Duration {
        Duration::from_millis(self.capacitance_log_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.capacitance_log_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_partial_nested_settings() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "monitor": {"max_connect_attempts": 2},
                "simulation": {"port": "/dev/ttyACM0", "device": {"powered": false, "firmware_version": "1.60"}}
            }"#,
        )
        .unwrap();

        assert_eq!(settings.monitor.max_connect_attempts, 2);
        assert_eq!(settings.monitor.retry_delay_ms, 100);
        assert_eq!(settings.simulation.port, "/dev/ttyACM0");
        assert!(!settings.simulation.device.powered);
        assert_eq!(
            settings.simulation.device.firmware_version.to_string(),
            "1.60.0"
        );
        assert!(settings.simulation.device.chip_present);
        assert_eq!(settings.simulation.flash_duration(), Duration::from_secs(3));
    }
}
