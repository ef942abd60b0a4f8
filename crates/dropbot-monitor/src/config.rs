//! Monitor configuration

use std::time::Duration;

use dropbot_protocol::{DEVICE_NAME, OUTPUT_ENABLE_PIN};
use serde::{Deserialize, Serialize};

/// Timing and identity settings for the monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Device identity to look for during discovery
    pub device_name: String,
    /// Time allowed for each port's identity query (milliseconds)
    pub discovery_timeout_ms: u64,
    /// Delay before rediscovering after no candidates or a failed attempt (milliseconds)
    pub retry_delay_ms: u64,
    /// Delay after a firmware flash before the port is used again (milliseconds)
    pub flash_settle_ms: u64,
    /// Active-low digital input reporting chip presence
    pub chip_presence_pin: u8,
    /// Connect attempts on one candidate before rediscovering
    pub max_connect_attempts: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            device_name: DEVICE_NAME.to_string(),
            discovery_timeout_ms: 100,
            retry_delay_ms: 100,
            flash_settle_ms: 500,
            chip_presence_pin: OUTPUT_ENABLE_PIN,
            max_connect_attempts: 5,
        }
    }
}

impl MonitorConfig {
    /// Identity query timeout
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    /// Retry delay
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Post-flash settle delay
    pub fn flash_settle(&self) -> Duration {
        Duration::from_millis(self.flash_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: MonitorConfig = serde_json::from_str(r#"{"retry_delay_ms": 250}"#).unwrap();
        assert_eq!(config.retry_delay(), Duration::from_millis(250));
        assert_eq!(config.flash_settle(), Duration::from_millis(500));
        assert_eq!(config.chip_presence_pin, 22);
        assert_eq!(config.device_name, "dropbot");
    }
}
