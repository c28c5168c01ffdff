//! Smart Pad GATT profile and command frames.
//!
//! The firmware (nRF52832 / DA14531 based) advertises a UART-like service
//! with one write characteristic (TX, commands in) and one notify
//! characteristic (RX, telemetry out). These constants must match what is
//! programmed into the firmware.

use serde::Serialize;
use uuid::Uuid;

/// Nordic UART style service UUID advertised by the Smart Pad.
pub const SERVICE_UUID: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";

/// TX characteristic (client writes command frames here).
pub const TX_CHAR_UUID: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";

/// RX characteristic (client subscribes; telemetry frames arrive here).
pub const RX_CHAR_UUID: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";

/// Advertised device names start with this product prefix.
pub const DEVICE_NAME_PREFIX: &str = "BintiPad";

pub const SERVICE: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
pub const TX_CHAR: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
pub const RX_CHAR: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Commands the client can send to the pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Request an on-demand reading outside the periodic cycle.
    RequestReading,
    /// Calibrate the pH sensor against an acidic reference solution.
    CalibrateAcid,
    /// Calibrate the pH sensor against a neutral (pH 7) reference solution.
    CalibrateNeutral,
    /// Calibrate the pH sensor against a basic reference solution.
    CalibrateBase,
}

#[derive(Serialize)]
struct CommandFrame<'a> {
    cmd: &'a str,
}

impl DeviceCommand {
    /// The firmware's command identifier.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::RequestReading => "read",
            Self::CalibrateAcid => "cal_acid",
            Self::CalibrateNeutral => "cal_mid",
            Self::CalibrateBase => "cal_base",
        }
    }

    /// Encode as the UTF-8 JSON frame written to the TX characteristic,
    /// e.g. `{"cmd":"read"}`.
    pub fn to_frame(&self) -> Vec<u8> {
        // CommandFrame only contains a string, serialization cannot fail.
        serde_json::to_vec(&CommandFrame {
            cmd: self.wire_name(),
        })
        .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_constants_agree() {
        assert_eq!(SERVICE.to_string(), SERVICE_UUID);
        assert_eq!(TX_CHAR.to_string(), TX_CHAR_UUID);
        assert_eq!(RX_CHAR.to_string(), RX_CHAR_UUID);
    }

    #[test]
    fn command_frames() {
        assert_eq!(DeviceCommand::RequestReading.to_frame(), b"{\"cmd\":\"read\"}");
        assert_eq!(
            DeviceCommand::CalibrateNeutral.to_frame(),
            b"{\"cmd\":\"cal_mid\"}"
        );
        assert_eq!(
            DeviceCommand::CalibrateAcid.to_frame(),
            b"{\"cmd\":\"cal_acid\"}"
        );
        assert_eq!(
            DeviceCommand::CalibrateBase.to_frame(),
            b"{\"cmd\":\"cal_base\"}"
        );
    }
}
