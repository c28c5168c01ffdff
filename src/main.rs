use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::info;

use bintipad_link::app::{AppContext, ReadingIngestor};
use bintipad_link::domain::settings::SettingsService;
use bintipad_link::infrastructure::api::ApiClient;
use bintipad_link::infrastructure::bluetooth::btle::{BtleConfig, BtleTransport};
use bintipad_link::infrastructure::bluetooth::supervisor::{ConnectionSupervisor, LinkConfig};
use bintipad_link::infrastructure::logging;

// Everything runs on one cooperative event loop; the BLE and HTTP calls are
// the only suspension points.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let settings_service = SettingsService::new()?;
    let settings = settings_service.get().clone();
    let _log_guard = logging::init_logger(&settings.log_settings)?;
    info!("Starting Binti Smart Pad link");

    let api = settings
        .api_base_url
        .as_ref()
        .map(|base| Arc::new(ApiClient::new(base.clone(), settings.api_token.clone())));
    if api.is_none() {
        info!("no API base URL configured; readings stay local");
    }

    let ctx = AppContext::shared();
    let (events, event_receiver) = mpsc::unbounded_channel();
    let ingestor = ReadingIngestor::new(ctx.clone(), api);
    tokio::spawn(ingestor.clone().run(event_receiver));

    let transport = BtleTransport::new(BtleConfig::from_settings(&settings)?);
    let mut supervisor =
        ConnectionSupervisor::new(transport, events, LinkConfig::from_settings(&settings));

    let device = supervisor
        .connect()
        .await
        .context("could not connect to the Smart Pad")?;
    ingestor.register_device(&device).await;

    info!("streaming readings; press Ctrl-C to disconnect");
    tokio::signal::ctrl_c().await?;

    supervisor.disconnect().await;
    // Let the final events drain before the runtime shuts down.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let ctx = ctx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(reading) = &ctx.latest_reading {
        info!(
            "last reading: pH {} moisture {}% temperature {}C battery {}%",
            reading.ph_text(),
            reading.moisture,
            reading.temperature_text(),
            reading.battery_level
        );
    }
    Ok(())
}
