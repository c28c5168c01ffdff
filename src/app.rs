//! Application-visible state and the reading ingestion loop.
//!
//! `AppContext` is the explicit, passed-in replacement for a global app-state
//! singleton: it owns the connection status, the paired device record, and
//! the single latest-reading slot the UI renders from. `ReadingIngestor` is
//! the sole consumer of the supervisor's event channel and fans events out to
//! the context, the persistence API, and the log.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::domain::models::{
    AppEvent, ConnectionStatus, DeviceConnection, MessageSeverity, SensorReading,
};
use crate::infrastructure::api::ApiClient;

/// Point-in-time application state. Everything here is a derived, disposable
/// copy; the supervisor remains the authority on the live session.
#[derive(Debug, Default)]
pub struct AppContext {
    pub connection: ConnectionStatus,
    pub device: Option<DeviceConnection>,
    /// Latest reading only; no local history is retained.
    pub latest_reading: Option<SensorReading>,
}

pub type SharedContext = Arc<Mutex<AppContext>>;

impl AppContext {
    pub fn shared() -> SharedContext {
        Arc::new(Mutex::new(Self::default()))
    }
}

/// Bridges parsed readings into application state and best-effort remote
/// persistence.
#[derive(Clone)]
pub struct ReadingIngestor {
    ctx: SharedContext,
    api: Option<Arc<ApiClient>>,
}

impl ReadingIngestor {
    pub fn new(ctx: SharedContext, api: Option<Arc<ApiClient>>) -> Self {
        Self { ctx, api }
    }

    fn ctx(&self) -> MutexGuard<'_, AppContext> {
        self.ctx.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a freshly paired device and let the backend know. The remote
    /// call is best-effort; pairing state is local truth.
    pub async fn register_device(&self, device: &DeviceConnection) {
        self.ctx().device = Some(device.clone());

        if let Some(api) = &self.api {
            if let Err(e) = api
                .connect_device(&device.device_id, &device.display_name)
                .await
            {
                warn!("failed to record device connect: {e}");
            }
        }
    }

    /// Consume events until the channel closes.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<AppEvent>) {
        while let Some(event) = events.recv().await {
            self.on_event(event);
        }
    }

    pub fn on_event(&self, event: AppEvent) {
        match event {
            AppEvent::Reading(reading) => self.on_reading(reading),
            AppEvent::ConnectionStatus(status) => self.on_status(status),
            AppEvent::LogMessage(status) => match status.severity {
                MessageSeverity::Warning => warn!("{}", status.message),
                MessageSeverity::Error => error!("{}", status.message),
                _ => info!("{}", status.message),
            },
        }
    }

    /// Overwrite the latest-reading slot, then persist in the background.
    /// Persistence failures are logged and never roll back the local update;
    /// the sensor stream cannot be paused.
    fn on_reading(&self, reading: SensorReading) {
        {
            let mut ctx = self.ctx();
            if let Some(device) = ctx.device.as_mut() {
                device.last_sync = reading.timestamp;
                device.battery_level = Some(reading.battery_level);
            }
            ctx.latest_reading = Some(reading.clone());
        }

        if let Some(api) = &self.api {
            let api = api.clone();
            tokio::spawn(async move {
                if let Err(e) = api.create_device_reading(&reading).await {
                    warn!("failed to persist reading: {e}");
                }
            });
        }
    }

    fn on_status(&self, status: ConnectionStatus) {
        let device_id = {
            let mut ctx = self.ctx();
            ctx.connection = status;
            match status {
                ConnectionStatus::Connected => {
                    if let Some(device) = ctx.device.as_mut() {
                        device.connected = true;
                    }
                    None
                }
                ConnectionStatus::Disconnected => ctx.device.as_mut().map(|device| {
                    device.connected = false;
                    device.device_id.clone()
                }),
                _ => None,
            }
        };

        // Device rows are never deleted, only marked disconnected.
        if let (Some(device_id), Some(api)) = (device_id, &self.api) {
            let api = api.clone();
            tokio::spawn(async move {
                if let Err(e) = api.disconnect_device(&device_id).await {
                    warn!("failed to record device disconnect: {e}");
                }
            });
        }
    }
}
