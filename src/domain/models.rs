//! Core data types shared across the Smart Pad connectivity stack.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One decoded, timestamped sensor observation.
///
/// Readings are append-only: once built from a frame they are never mutated.
/// `raw` keeps the original decoded payload so fields the firmware adds later
/// survive a round trip through this struct.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    /// Stable hardware identifier of the device that produced this reading.
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    /// pH in the 0-14 range, one-decimal precision.
    pub ph: f64,
    /// Moisture percentage, 0-100 integer.
    pub moisture: i64,
    /// Temperature in Celsius, one-decimal precision.
    pub temperature_c: f64,
    pub flow_rate: Option<f64>,
    pub volume_ml: Option<f64>,
    /// Battery percentage reported with the frame, 0-100.
    pub battery_level: u8,
    /// Original decoded payload, retained for forward compatibility.
    pub raw: serde_json::Value,
}

impl SensorReading {
    /// pH rendered with one decimal place, e.g. `"7.2"`.
    pub fn ph_text(&self) -> String {
        format!("{:.1}", self.ph)
    }

    /// Temperature rendered with one decimal place, e.g. `"36.6"`.
    pub fn temperature_text(&self) -> String {
        format!("{:.1}", self.temperature_c)
    }
}

/// A paired physical wearable as the application tracks it.
///
/// Created on first successful pairing; the supervisor mutates the status and
/// sync fields, nothing else does. Device records are never deleted, only
/// marked disconnected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConnection {
    pub device_id: String,
    pub display_name: String,
    pub connected: bool,
    pub battery_level: Option<u8>,
    pub firmware_version: Option<String>,
    pub last_sync: DateTime<Utc>,
}

impl DeviceConnection {
    pub fn new(device_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            display_name: display_name.into(),
            connected: true,
            battery_level: None,
            firmware_version: None,
            last_sync: Utc::now(),
        }
    }
}

/// Connection lifecycle states of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Events published by the connectivity core.
///
/// The supervisor is the only producer; the ingestor consumes and fans out to
/// application state, persistence, and logging.
#[derive(Debug, Clone)]
pub enum AppEvent {
    Reading(SensorReading),
    ConnectionStatus(ConnectionStatus),
    LogMessage(StatusMessage),
}

/// A user-facing status line.
#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>, severity: MessageSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
