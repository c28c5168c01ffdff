//! Bluetooth LE connectivity for the Smart Pad.
//!
//! - [`protocol`]: the firmware's GATT profile and command frames
//! - [`transport`]: the platform-stack seam ([`transport::Transport`])
//! - [`btle`]: production transport over btleplug
//! - [`mock`]: scripted transport for tests
//! - [`supervisor`]: connection lifecycle and retry policy

pub mod btle;
pub mod mock;
pub mod protocol;
pub mod supervisor;
pub mod transport;
