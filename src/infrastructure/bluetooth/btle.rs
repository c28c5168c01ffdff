//! btleplug-backed [`Transport`] implementation.
//!
//! Discovery scans for peripherals advertising the product name prefix,
//! connection resolves the UART-like service plus TX/RX characteristics and
//! subscribes to RX notifications. Notification and disconnect events are
//! pumped into the link channel the supervisor consumes.

use std::collections::HashMap;
use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::transport::{
    DeviceHandle, LinkEvent, Transport, TransportError,
};

/// GATT profile and scan behavior for the production transport.
#[derive(Debug, Clone)]
pub struct BtleConfig {
    pub service_uuid: Uuid,
    pub tx_char_uuid: Uuid,
    pub rx_char_uuid: Uuid,
    pub scan_timeout: Duration,
    /// Debug aid: ignore the name prefix and accept any named peripheral.
    pub show_all_devices: bool,
}

impl Default for BtleConfig {
    fn default() -> Self {
        Self {
            service_uuid: protocol::SERVICE,
            tx_char_uuid: protocol::TX_CHAR,
            rx_char_uuid: protocol::RX_CHAR,
            scan_timeout: Duration::from_secs(10),
            show_all_devices: false,
        }
    }
}

impl BtleConfig {
    /// Build from user settings; the UUID overrides must parse.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            service_uuid: Uuid::parse_str(&settings.ble_service_uuid)?,
            tx_char_uuid: Uuid::parse_str(&settings.ble_tx_char_uuid)?,
            rx_char_uuid: Uuid::parse_str(&settings.ble_rx_char_uuid)?,
            scan_timeout: Duration::from_millis(settings.scan_timeout_ms),
            show_all_devices: settings.debug_show_all_devices,
        })
    }
}

struct OpenSession {
    peripheral: Peripheral,
    tx_char: Characteristic,
    rx_char: Characteristic,
}

/// Cross-platform BLE transport over the host adapter.
pub struct BtleTransport {
    config: BtleConfig,
    adapter: Option<Adapter>,
    discovered: HashMap<String, Peripheral>,
    session: Option<OpenSession>,
}

impl BtleTransport {
    pub fn new(config: BtleConfig) -> Self {
        Self {
            config,
            adapter: None,
            discovered: HashMap::new(),
            session: None,
        }
    }

    async fn ensure_adapter(&mut self) -> Result<Adapter, TransportError> {
        if let Some(adapter) = &self.adapter {
            return Ok(adapter.clone());
        }
        let manager = Manager::new()
            .await
            .map_err(|_| TransportError::PlatformUnsupported)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|_| TransportError::PlatformUnsupported)?
            .into_iter()
            .next()
            .ok_or(TransportError::PlatformUnsupported)?;
        self.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    /// Resolve the service and both characteristics on a connected
    /// peripheral and enable RX notifications.
    async fn resolve_characteristics(
        &self,
        peripheral: &Peripheral,
    ) -> Result<(Characteristic, Characteristic), TransportError> {
        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("service discovery: {e}")))?;

        if !peripheral
            .services()
            .iter()
            .any(|s| s.uuid == self.config.service_uuid)
        {
            return Err(TransportError::ConnectionFailed(format!(
                "service {} not found",
                self.config.service_uuid
            )));
        }

        let characteristics = peripheral.characteristics();
        let tx_char = characteristics
            .iter()
            .find(|c| c.uuid == self.config.tx_char_uuid)
            .cloned()
            .ok_or_else(|| {
                TransportError::ConnectionFailed("TX characteristic not found".into())
            })?;
        let rx_char = characteristics
            .iter()
            .find(|c| c.uuid == self.config.rx_char_uuid)
            .cloned()
            .ok_or_else(|| {
                TransportError::ConnectionFailed("RX characteristic not found".into())
            })?;

        peripheral
            .subscribe(&rx_char)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("RX subscribe: {e}")))?;

        Ok((tx_char, rx_char))
    }

    /// Pump RX notifications and the adapter's disconnect events into the
    /// link channel the supervisor consumes.
    async fn spawn_link_pumps(
        &self,
        adapter: &Adapter,
        peripheral: &Peripheral,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<(), TransportError> {
        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("notifications: {e}")))?;
        let rx_uuid = self.config.rx_char_uuid;
        let frame_sender = events.clone();
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != rx_uuid {
                    continue;
                }
                if frame_sender
                    .send(LinkEvent::Frame(notification.value))
                    .is_err()
                {
                    break;
                }
            }
            let _ = frame_sender.send(LinkEvent::Dropped);
        });

        let mut central_events = adapter
            .events()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("adapter events: {e}")))?;
        let target = peripheral.id();
        tokio::spawn(async move {
            while let Some(event) = central_events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    if id == target {
                        debug!("platform reported peripheral disconnected");
                        let _ = events.send(LinkEvent::Dropped);
                        break;
                    }
                }
            }
        });

        Ok(())
    }
}

impl Transport for BtleTransport {
    async fn is_supported(&self) -> bool {
        match Manager::new().await {
            Ok(manager) => manager
                .adapters()
                .await
                .map(|adapters| !adapters.is_empty())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn request_device(&mut self, name_prefix: &str) -> Result<DeviceHandle, TransportError> {
        let adapter = self.ensure_adapter().await?;

        info!("scanning for peripherals named {name_prefix}*");
        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("scan: {e}")))?;
        tokio::time::sleep(self.config.scan_timeout).await;
        if let Err(e) = adapter.stop_scan().await {
            warn!("failed to stop scan: {e}");
        }

        let peripherals = adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("peripherals: {e}")))?;

        let mut best: Option<(DeviceHandle, Peripheral)> = None;
        for peripheral in peripherals {
            let Ok(Some(props)) = peripheral.properties().await else {
                continue;
            };
            let Some(name) = props.local_name else {
                continue;
            };
            if !self.config.show_all_devices && !name.starts_with(name_prefix) {
                continue;
            }
            let handle = DeviceHandle {
                id: props.address.to_string(),
                name,
                rssi: props.rssi,
            };
            let stronger = match &best {
                Some((current, _)) => handle.rssi.unwrap_or(i16::MIN) > current.rssi.unwrap_or(i16::MIN),
                None => true,
            };
            if stronger {
                best = Some((handle, peripheral));
            }
        }

        let (handle, peripheral) = best.ok_or(TransportError::DeviceNotSelected)?;
        info!(
            "selected {} ({}) rssi={:?}",
            handle.name, handle.id, handle.rssi
        );
        self.discovered.insert(handle.id.clone(), peripheral);
        Ok(handle)
    }

    async fn open(
        &mut self,
        handle: &DeviceHandle,
    ) -> Result<mpsc::UnboundedReceiver<LinkEvent>, TransportError> {
        let adapter = self.ensure_adapter().await?;
        let peripheral = self
            .discovered
            .get(&handle.id)
            .cloned()
            .ok_or(TransportError::DeviceNotSelected)?;

        peripheral
            .connect()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("connect: {e}")))?;

        // Any failure past this point must not leave a half-open session.
        let (tx_char, rx_char) = match self.resolve_characteristics(&peripheral).await {
            Ok(chars) => chars,
            Err(e) => {
                if let Err(close_err) = peripheral.disconnect().await {
                    warn!("teardown after failed setup also failed: {close_err}");
                }
                return Err(e);
            }
        };

        let (link_sender, link_receiver) = mpsc::unbounded_channel();
        if let Err(e) = self
            .spawn_link_pumps(&adapter, &peripheral, link_sender)
            .await
        {
            let _ = peripheral.unsubscribe(&rx_char).await;
            if let Err(close_err) = peripheral.disconnect().await {
                warn!("teardown after failed setup also failed: {close_err}");
            }
            return Err(e);
        }

        info!("GATT session established with {}", handle.name);
        self.session = Some(OpenSession {
            peripheral,
            tx_char,
            rx_char,
        });
        Ok(link_receiver)
    }

    async fn write(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let Some(session) = &self.session else {
            return Err(TransportError::NotConnected);
        };
        session
            .peripheral
            .write(&session.tx_char, payload, WriteType::WithResponse)
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.peripheral.unsubscribe(&session.rx_char).await {
                debug!("RX unsubscribe during close: {e}");
            }
            if let Err(e) = session.peripheral.disconnect().await {
                warn!("platform disconnect failed: {e}");
            }
        }
        Ok(())
    }
}
