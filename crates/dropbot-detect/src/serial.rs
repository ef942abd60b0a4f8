//! Serial port enumeration
//!
//! Lists the host's serial ports and identifies the device behind each one.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serialport::{available_ports, SerialPortType};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::DetectError;
use crate::probe::DeviceProbe;
use crate::scanner::{PortEntry, PortEnumerator};

/// Information about a serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyACM0, COM3)
    pub port: String,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB serial number (if available)
    pub serial_number: Option<String>,
    /// USB product string
    pub product: Option<String>,
}

impl SerialPortInfo {
    /// Create from serialport crate's port info
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                port: name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                serial_number: usb.serial_number.clone(),
                product: usb.product.clone(),
            },
            _ => Self {
                port: name,
                vid: None,
                pid: None,
                serial_number: None,
                product: None,
            },
        }
    }
}

/// Serial port enumeration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Skip ports whose name contains any of these patterns
    pub skip_patterns: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            skip_patterns: vec![
                // Bluetooth ports on macOS
                "Bluetooth".to_string(),
                // Debug/logging ports
                "debug".to_string(),
            ],
        }
    }
}

impl ScannerConfig {
    /// Check if a port should be skipped
    fn should_skip(&self, port: &SerialPortInfo) -> bool {
        self.skip_patterns
            .iter()
            .any(|pattern| port.port.contains(pattern.as_str()))
    }
}

/// Enumerates OS serial ports and identifies each through a [`DeviceProbe`]
pub struct SerialPortEnumerator<P> {
    probe: P,
    config: ScannerConfig,
}

impl<P: DeviceProbe> SerialPortEnumerator<P> {
    /// Create an enumerator with the default configuration
    pub fn new(probe: P) -> Self {
        Self::with_config(probe, ScannerConfig::default())
    }

    /// Create an enumerator with a custom configuration
    pub fn with_config(probe: P, config: ScannerConfig) -> Self {
        Self { probe, config }
    }

    /// List OS ports, minus the skipped ones
    fn system_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        let ports = available_ports()?;
        Ok(self.filter_ports(
            ports
                .into_iter()
                .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type))
                .collect(),
        ))
    }

    fn filter_ports(&self, ports: Vec<SerialPortInfo>) -> Vec<SerialPortInfo> {
        ports
            .into_iter()
            .filter(|p| !self.config.should_skip(p))
            .collect()
    }

    /// Identify every port concurrently, bounding each query by `per_port`
    async fn identify_all(&self, ports: Vec<SerialPortInfo>, per_port: Duration) -> Vec<PortEntry> {
        let probes = ports.into_iter().map(|info| async move {
            match timeout(per_port, self.probe.identify(&info)).await {
                Ok(Some(identity)) => {
                    trace!("{} identified as {} v{}", info.port, identity.name, identity.version);
                    PortEntry::identified(info.port, identity.name, identity.version)
                }
                Ok(None) => PortEntry::unidentified(info.port),
                Err(_) => {
                    trace!("Identity query timed out on {}", info.port);
                    PortEntry::unidentified(info.port)
                }
            }
        });
        join_all(probes).await
    }
}

#[async_trait]
impl<P: DeviceProbe> PortEnumerator for SerialPortEnumerator<P> {
    async fn list(&self, timeout: Duration) -> Result<Vec<PortEntry>, DetectError> {
        let ports = self.system_ports()?;
        debug!("Probing {} serial port(s)", ports.len());
        Ok(self.identify_all(ports, timeout).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::DeviceIdentity;
    use dropbot_protocol::Version;
    use serialport::UsbPortInfo;

    struct ScriptedProbe;

    #[async_trait]
    impl DeviceProbe for ScriptedProbe {
        async fn identify(&self, port: &SerialPortInfo) -> Option<DeviceIdentity> {
            match port.port.as_str() {
                "/dev/ttyACM0" => Some(DeviceIdentity {
                    name: "dropbot".into(),
                    version: Version::new(1, 70, 0),
                }),
                "/dev/ttyACM1" => {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    None
                }
                _ => None,
            }
        }
    }

    fn plain(port: &str) -> SerialPortInfo {
        SerialPortInfo::from_serialport(port.to_string(), &SerialPortType::Unknown)
    }

    #[test]
    fn test_serial_port_info_from_usb() {
        let usb_info = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x16c0,
            pid: 0x0483,
            serial_number: Some("12345".to_string()),
            manufacturer: Some("Sci-Bots".to_string()),
            product: Some("DropBot".to_string()),
        });

        let info = SerialPortInfo::from_serialport("/dev/ttyACM0".to_string(), &usb_info);

        assert_eq!(info.vid, Some(0x16c0));
        assert_eq!(info.pid, Some(0x0483));
        assert_eq!(info.product.as_deref(), Some("DropBot"));
    }

    #[test]
    fn test_skip_patterns() {
        let enumerator = SerialPortEnumerator::new(ScriptedProbe);
        let kept = enumerator.filter_ports(vec![
            plain("/dev/cu.Bluetooth-Incoming-Port"),
            plain("/dev/ttyACM0"),
            plain("/dev/cu.debug-console"),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].port, "/dev/ttyACM0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_identify_all_bounds_slow_ports() {
        let enumerator = SerialPortEnumerator::new(ScriptedProbe);
        let entries = enumerator
            .identify_all(
                vec![plain("/dev/ttyACM0"), plain("/dev/ttyACM1"), plain("/dev/ttyS0")],
                Duration::from_millis(100),
            )
            .await;

        assert_eq!(
            entries,
            vec![
                PortEntry::identified("/dev/ttyACM0", "dropbot", Version::new(1, 70, 0)),
                PortEntry::unidentified("/dev/ttyACM1"),
                PortEntry::unidentified("/dev/ttyS0"),
            ]
        );
    }
}
