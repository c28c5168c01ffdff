//! Connection lifecycle supervision.
//!
//! Owns the transport and the live session, drives the
//! `Idle -> Connecting -> Connected -> Disconnected` state machine, applies
//! the bounded retry policy, and routes inbound frames through the parser
//! onto the application event channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::frame;
use crate::domain::models::{
    AppEvent, ConnectionStatus, DeviceConnection, MessageSeverity, SensorReading, StatusMessage,
};
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::protocol::{DeviceCommand, DEVICE_NAME_PREFIX};
use crate::infrastructure::bluetooth::transport::{LinkEvent, Transport, TransportError};

/// Connection behavior knobs.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Advertised-name prefix the device picker is restricted to.
    pub name_prefix: String,
    /// Additional connect attempts after the first failure. Retries are
    /// unconditional (no backoff): each attempt includes device discovery,
    /// which already throttles the loop.
    pub max_connect_retries: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEVICE_NAME_PREFIX.to_string(),
            max_connect_retries: 3,
        }
    }
}

impl LinkConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            name_prefix: settings.device_name_prefix.clone(),
            max_connect_retries: settings.max_connect_retries,
        }
    }
}

/// In-memory state for one connection session. Destroyed on explicit
/// disconnect or unrecoverable failure.
struct Session {
    device: DeviceConnection,
    /// Cleared exactly once per session, by whichever side observes the end
    /// of the link first. Guards the single Disconnected notification.
    alive: Arc<AtomicBool>,
}

/// Supervises one wearable link over a [`Transport`].
pub struct ConnectionSupervisor<T: Transport> {
    transport: T,
    events: mpsc::UnboundedSender<AppEvent>,
    config: LinkConfig,
    status: ConnectionStatus,
    session: Option<Session>,
}

impl<T: Transport> ConnectionSupervisor<T> {
    pub fn new(transport: T, events: mpsc::UnboundedSender<AppEvent>, config: LinkConfig) -> Self {
        Self {
            transport,
            events,
            config,
            status: ConnectionStatus::Idle,
            session: None,
        }
    }

    /// Current lifecycle state. A link drop observed by the pump shows up
    /// here without an explicit `disconnect` call.
    pub fn status(&self) -> ConnectionStatus {
        if self.status == ConnectionStatus::Connected && !self.is_connected() {
            ConnectionStatus::Disconnected
        } else {
            self.status
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, |s| s.alive.load(Ordering::SeqCst))
    }

    /// The device record for the active or most recent session.
    pub fn device(&self) -> Option<&DeviceConnection> {
        self.session.as_ref().map(|s| &s.device)
    }

    /// Establish a session: discover a matching peripheral, open the GATT
    /// link, and start routing telemetry.
    ///
    /// `ConnectionFailed` attempts are retried up to the configured cap;
    /// `DeviceNotSelected` and `PlatformUnsupported` surface immediately.
    /// After the cap the terminal failure propagates and the supervisor
    /// stays Disconnected.
    pub async fn connect(&mut self) -> Result<DeviceConnection, TransportError> {
        if let Some(session) = &self.session {
            if session.alive.load(Ordering::SeqCst) {
                return Ok(session.device.clone());
            }
        }

        if !self.transport.is_supported().await {
            self.send_log(
                "Bluetooth is not available on this device. Please use a client with BLE support.",
                MessageSeverity::Error,
            );
            return Err(TransportError::PlatformUnsupported);
        }

        self.set_status(ConnectionStatus::Connecting);
        self.send_log("Scanning for Smart Pad...", MessageSeverity::Info);

        let mut retries = 0u32;
        loop {
            match self.try_connect().await {
                Ok(device) => {
                    self.set_status(ConnectionStatus::Connected);
                    self.send_log("Smart Pad connected", MessageSeverity::Success);
                    info!("connected to {} ({})", device.display_name, device.device_id);
                    return Ok(device);
                }
                Err(TransportError::ConnectionFailed(reason))
                    if retries < self.config.max_connect_retries =>
                {
                    retries += 1;
                    warn!(
                        "connect attempt failed: {reason}; retrying ({retries}/{})",
                        self.config.max_connect_retries
                    );
                }
                Err(e) => {
                    self.set_status(ConnectionStatus::Disconnected);
                    self.send_log(
                        "Could not connect to Smart Pad. Please re-seat the device and try again.",
                        MessageSeverity::Error,
                    );
                    return Err(e);
                }
            }
        }
    }

    /// One full connect sequence: picker, then GATT setup, then the pump.
    async fn try_connect(&mut self) -> Result<DeviceConnection, TransportError> {
        let handle = self
            .transport
            .request_device(&self.config.name_prefix)
            .await?;
        let link = self.transport.open(&handle).await?;

        let device = DeviceConnection::new(handle.id.clone(), handle.name.clone());
        let alive = Arc::new(AtomicBool::new(true));
        self.spawn_link_pump(link, handle.id, alive.clone());
        self.session = Some(Session {
            device: device.clone(),
            alive,
        });
        Ok(device)
    }

    /// Route link events until the link ends. Frames are decoded and
    /// published; malformed frames are logged and dropped without touching
    /// the connection.
    fn spawn_link_pump(
        &self,
        mut link: mpsc::UnboundedReceiver<LinkEvent>,
        device_id: String,
        alive: Arc<AtomicBool>,
    ) {
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(event) = link.recv().await {
                match event {
                    LinkEvent::Frame(bytes) => match frame::decode(&bytes) {
                        Ok(parsed) => {
                            let reading = SensorReading::from_frame(&device_id, parsed);
                            let _ = events.send(AppEvent::Reading(reading));
                        }
                        Err(e) => warn!("discarding frame: {e}"),
                    },
                    LinkEvent::Dropped => break,
                }
            }
            if alive.swap(false, Ordering::SeqCst) {
                let _ = events.send(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
                let _ = events.send(AppEvent::LogMessage(StatusMessage::new(
                    "Smart Pad disconnected",
                    MessageSeverity::Warning,
                )));
            }
        });
    }

    /// User-initiated disconnect. Idempotent: a second call (or a call after
    /// the link already dropped) emits nothing further. Local state is
    /// cleared synchronously; the emitted Disconnected event is the
    /// authoritative completion signal.
    pub async fn disconnect(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        let was_alive = session.alive.swap(false, Ordering::SeqCst);
        if let Err(e) = self.transport.close().await {
            warn!("transport teardown failed: {e}");
        }
        self.status = ConnectionStatus::Disconnected;
        if was_alive {
            let _ = self
                .events
                .send(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
            self.send_log("Disconnected from Smart Pad", MessageSeverity::Info);
        }
    }

    /// Serialize and write a command frame. Valid only while Connected; a
    /// dropped link makes this fail without reaching the platform.
    pub async fn send_command(&mut self, command: DeviceCommand) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.transport.write(&command.to_frame()).await
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
        let _ = self.events.send(AppEvent::ConnectionStatus(status));
    }

    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self
            .events
            .send(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::mock::MockTransport;

    fn supervisor(
        mock: MockTransport,
    ) -> (
        ConnectionSupervisor<MockTransport>,
        mpsc::UnboundedReceiver<AppEvent>,
    ) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            ConnectionSupervisor::new(mock, sender, LinkConfig::default()),
            receiver,
        )
    }

    fn drain_disconnect_events(receiver: &mut mpsc::UnboundedReceiver<AppEvent>) -> usize {
        let mut count = 0;
        while let Ok(event) = receiver.try_recv() {
            if matches!(
                event,
                AppEvent::ConnectionStatus(ConnectionStatus::Disconnected)
            ) {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn connects_on_first_attempt() {
        let mock = MockTransport::new();
        let (mut sup, _events) = supervisor(mock.clone());

        let device = sup.connect().await.unwrap();
        assert_eq!(device.display_name, "BintiPad-01");
        assert!(sup.is_connected());
        assert_eq!(sup.status(), ConnectionStatus::Connected);
        assert_eq!(mock.open_attempts(), 1);
    }

    #[tokio::test]
    async fn retries_connection_failures_then_succeeds() {
        let mock = MockTransport::new().with_open_failures(3);
        let (mut sup, _events) = supervisor(mock.clone());

        sup.connect().await.unwrap();
        assert_eq!(mock.open_attempts(), 4);
        assert!(sup.is_connected());
    }

    #[tokio::test]
    async fn fourth_consecutive_failure_is_terminal() {
        let mock = MockTransport::new().with_open_failures(u32::MAX);
        let (mut sup, _events) = supervisor(mock.clone());

        let err = sup.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
        // Initial attempt plus exactly three retries, nothing after.
        assert_eq!(mock.open_attempts(), 4);
        assert_eq!(sup.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn cancelled_picker_is_not_retried() {
        let mock = MockTransport::new().with_cancelled_picker();
        let (mut sup, _events) = supervisor(mock.clone());

        let err = sup.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::DeviceNotSelected));
        assert_eq!(mock.open_attempts(), 0);
    }

    #[tokio::test]
    async fn unsupported_platform_surfaces_immediately() {
        let mock = MockTransport::new().unsupported();
        let (mut sup, _events) = supervisor(mock);

        let err = sup.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::PlatformUnsupported));
        assert_eq!(sup.status(), ConnectionStatus::Idle);
    }

    #[tokio::test]
    async fn command_after_disconnect_fails_without_platform_call() {
        let mock = MockTransport::new();
        let (mut sup, _events) = supervisor(mock.clone());

        sup.connect().await.unwrap();
        sup.disconnect().await;

        let err = sup.send_command(DeviceCommand::RequestReading).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn command_after_link_drop_fails_without_platform_call() {
        let mock = MockTransport::new();
        let (mut sup, _events) = supervisor(mock.clone());

        sup.connect().await.unwrap();
        mock.drop_link();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let err = sup.send_command(DeviceCommand::RequestReading).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
        assert!(mock.writes().is_empty());
        assert_eq!(sup.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn command_while_connected_reaches_the_pad() {
        let mock = MockTransport::new();
        let (mut sup, _events) = supervisor(mock.clone());

        sup.connect().await.unwrap();
        sup.send_command(DeviceCommand::CalibrateNeutral).await.unwrap();

        assert_eq!(mock.writes(), vec![b"{\"cmd\":\"cal_mid\"}".to_vec()]);
    }

    #[tokio::test]
    async fn double_disconnect_emits_one_event() {
        let mock = MockTransport::new();
        let (mut sup, mut events) = supervisor(mock);

        sup.connect().await.unwrap();
        drain_disconnect_events(&mut events);

        sup.disconnect().await;
        sup.disconnect().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(drain_disconnect_events(&mut events), 1);
    }
}
