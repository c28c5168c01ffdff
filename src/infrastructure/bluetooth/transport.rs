//! The seam between the connection supervisor and the host Bluetooth stack.
//!
//! [`Transport`] is the only surface the supervisor talks to; the production
//! implementation lives in [`super::btle`] and the scripted test double in
//! [`super::mock`].

use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised by a transport implementation.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The host lacks Bluetooth Low Energy capability. Not retryable; the
    /// user needs a supported client.
    #[error("Bluetooth Low Energy is not available on this host")]
    PlatformUnsupported,

    /// No matching peripheral was selected or found during discovery.
    /// Not retried automatically; the user may try again.
    #[error("no Smart Pad was selected")]
    DeviceNotSelected,

    /// GATT connect, service resolution, or characteristic setup failed.
    /// Retryable up to the supervisor's attempt cap.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A write or command was attempted without an active session.
    #[error("not connected to a device")]
    NotConnected,

    /// The platform rejected a TX write.
    #[error("write rejected: {0}")]
    WriteFailed(String),
}

/// One discovered peripheral, before any GATT connection exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Stable hardware identifier (MAC address or platform UUID).
    pub id: String,
    /// Advertised local name.
    pub name: String,
    pub rssi: Option<i16>,
}

/// Events emitted by an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// One notification payload from the RX characteristic, delivered FIFO.
    Frame(Vec<u8>),
    /// The platform reported the peripheral gone. Terminal for the link.
    Dropped,
}

/// Platform Bluetooth abstraction: probe, pick, connect, write, tear down.
///
/// Implementations own all live platform handles. At most one session is
/// open at a time; `open` on an already-open transport replaces the session.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Capability probe. Must be called before any connect attempt; returns
    /// `false` with no side effects when the host has no BLE support.
    async fn is_supported(&self) -> bool;

    /// Discover a peripheral whose advertised name starts with `name_prefix`.
    async fn request_device(&mut self, name_prefix: &str) -> Result<DeviceHandle, TransportError>;

    /// Connect, resolve the primary service and TX/RX characteristics, and
    /// enable notifications on RX. On any step failure partial state is torn
    /// down before the error propagates; no dangling subscriptions remain.
    ///
    /// The returned channel yields RX frames in platform order and a final
    /// [`LinkEvent::Dropped`] when the peripheral goes away.
    async fn open(
        &mut self,
        handle: &DeviceHandle,
    ) -> Result<mpsc::UnboundedReceiver<LinkEvent>, TransportError>;

    /// Write a command frame to the TX characteristic.
    async fn write(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Tear down the current session. Idempotent.
    async fn close(&mut self) -> Result<(), TransportError>;
}
