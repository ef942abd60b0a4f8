//! Event names carried by the monitor's event bus
//!
//! Names are the exact strings applications subscribe to. Native device
//! signals keep the firmware's spelling (`output_enabled`,
//! `capacitance-updated`, ...); the monitor forwards them verbatim and adds
//! the chip presence aliases.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named signal on the event bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Signal {
    // -------------------------------------------------------------------------
    // Supervisor lifecycle (outbound)
    // -------------------------------------------------------------------------
    /// A new session is usable
    #[serde(rename = "connected")]
    Connected,
    /// The session was lost or closed
    #[serde(rename = "disconnected")]
    Disconnected,
    /// The supervisor is shutting down
    #[serde(rename = "closed")]
    Closed,
    /// A chip was inserted (edge event or synthetic check on connect)
    #[serde(rename = "chip-inserted")]
    ChipInserted,
    /// A chip was removed (edge event or synthetic check on connect)
    #[serde(rename = "chip-removed")]
    ChipRemoved,

    // -------------------------------------------------------------------------
    // Recovery queries (outbound, answered by handlers)
    // -------------------------------------------------------------------------
    /// Connection blocked by a missing 12V supply
    #[serde(rename = "no-power")]
    NoPower,
    /// Connection blocked by a driver/firmware version gap
    #[serde(rename = "version-mismatch")]
    VersionMismatch,

    // -------------------------------------------------------------------------
    // Native device signals (forwarded verbatim)
    // -------------------------------------------------------------------------
    /// Device reported a halt
    #[serde(rename = "halted")]
    Halted,
    /// High voltage output enabled (chip present)
    #[serde(rename = "output_enabled")]
    OutputEnabled,
    /// High voltage output disabled (chip absent)
    #[serde(rename = "output_disabled")]
    OutputDisabled,
    /// Capacitance telemetry
    #[serde(rename = "capacitance-updated")]
    CapacitanceUpdated,
    /// Actuated channel telemetry
    #[serde(rename = "channels-updated")]
    ChannelsUpdated,
    /// Shorted channels detected
    #[serde(rename = "shorts-detected")]
    ShortsDetected,

    // -------------------------------------------------------------------------
    // Commands (inbound)
    // -------------------------------------------------------------------------
    /// Terminate the session (if any) and flash firmware
    #[serde(rename = "flash-firmware")]
    FlashFirmware,
    /// Reboot the connected device
    #[serde(rename = "reboot")]
    Reboot,
    /// Drop the current session so the monitor reconnects
    #[serde(rename = "reconnect")]
    Reconnect,
}

/// Signals emitted natively by a connected device
pub const DEVICE_SIGNALS: [Signal; 6] = [
    Signal::Halted,
    Signal::OutputEnabled,
    Signal::OutputDisabled,
    Signal::CapacitanceUpdated,
    Signal::ChannelsUpdated,
    Signal::ShortsDetected,
];

impl Signal {
    /// Every signal, in declaration order
    pub const ALL: [Signal; 16] = [
        Signal::Connected,
        Signal::Disconnected,
        Signal::Closed,
        Signal::ChipInserted,
        Signal::ChipRemoved,
        Signal::NoPower,
        Signal::VersionMismatch,
        Signal::Halted,
        Signal::OutputEnabled,
        Signal::OutputDisabled,
        Signal::CapacitanceUpdated,
        Signal::ChannelsUpdated,
        Signal::ShortsDetected,
        Signal::FlashFirmware,
        Signal::Reboot,
        Signal::Reconnect,
    ];

    /// The wire name of this signal
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Connected => "connected",
            Signal::Disconnected => "disconnected",
            Signal::Closed => "closed",
            Signal::ChipInserted => "chip-inserted",
            Signal::ChipRemoved => "chip-removed",
            Signal::NoPower => "no-power",
            Signal::VersionMismatch => "version-mismatch",
            Signal::Halted => "halted",
            Signal::OutputEnabled => "output_enabled",
            Signal::OutputDisabled => "output_disabled",
            Signal::CapacitanceUpdated => "capacitance-updated",
            Signal::ChannelsUpdated => "channels-updated",
            Signal::ShortsDetected => "shorts-detected",
            Signal::FlashFirmware => "flash-firmware",
            Signal::Reboot => "reboot",
            Signal::Reconnect => "reconnect",
        }
    }

    /// Check if this signal originates from the device itself
    pub fn is_device_native(&self) -> bool {
        DEVICE_SIGNALS.contains(self)
    }

    /// Check if this signal is an inbound command
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            Signal::FlashFirmware | Signal::Reboot | Signal::Reconnect
        )
    }

    /// Check if this signal is high-frequency telemetry
    pub fn is_telemetry(&self) -> bool {
        matches!(
            self,
            Signal::CapacitanceUpdated | Signal::ChannelsUpdated | Signal::ShortsDetected
        )
    }

    /// Additional name a native signal is forwarded under
    ///
    /// `output_enabled` doubles as `chip-inserted` and `output_disabled` as
    /// `chip-removed`.
    pub fn forwarded_alias(&self) -> Option<Signal> {
        match self {
            Signal::OutputEnabled => Some(Signal::ChipInserted),
            Signal::OutputDisabled => Some(Signal::ChipRemoved),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signal::ALL
            .iter()
            .copied()
            .find(|signal| signal.as_str() == s)
            .ok_or_else(|| format!("unknown signal: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_signal_classification() {
        assert!(Signal::OutputEnabled.is_device_native());
        assert!(Signal::CapacitanceUpdated.is_device_native());
        assert!(!Signal::ChipInserted.is_device_native());
        assert!(!Signal::Connected.is_device_native());

        assert!(Signal::Reconnect.is_command());
        assert!(!Signal::Halted.is_command());

        assert!(Signal::ShortsDetected.is_telemetry());
        assert!(!Signal::Halted.is_telemetry());
    }

    #[test]
    fn test_chip_aliases() {
        assert_eq!(
            Signal::OutputEnabled.forwarded_alias(),
            Some(Signal::ChipInserted)
        );
        assert_eq!(
            Signal::OutputDisabled.forwarded_alias(),
            Some(Signal::ChipRemoved)
        );
        assert_eq!(Signal::Halted.forwarded_alias(), None);
    }

    #[test]
    fn test_names_are_unique_and_parse() {
        let mut names: Vec<_> = Signal::ALL.iter().map(Signal::as_str).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Signal::ALL.len());

        assert_eq!("version-mismatch".parse(), Ok(Signal::VersionMismatch));
        assert!("output-enabled".parse::<Signal>().is_err());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&Signal::CapacitanceUpdated).unwrap();
        assert_eq!(json, "\"capacitance-updated\"");
    }
}
