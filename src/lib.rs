//! Connectivity core for the Binti Smart Pad wearable.
//!
//! The crate discovers and connects to the pad over Bluetooth LE, decodes
//! its telemetry frames (JSON or CSV), supervises the connection lifecycle
//! with a bounded retry policy, and maintains the application-visible state
//! (connection status plus the latest reading) while best-effort persisting
//! readings to the Binti backend.
//!
//! Layering mirrors the data flow: the transport delivers raw notification
//! bytes, [`domain::frame`] decodes them into readings, the
//! [`infrastructure::bluetooth::supervisor`] owns the lifecycle and publishes
//! typed events, and [`app::ReadingIngestor`] updates state and persists.

pub mod app;
pub mod domain;
pub mod infrastructure;

pub use app::{AppContext, ReadingIngestor, SharedContext};
pub use domain::models::{AppEvent, ConnectionStatus, DeviceConnection, SensorReading};
