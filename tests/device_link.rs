//! End-to-end scenarios over the scripted transport: inbound notification
//! bytes all the way to the application's latest-reading slot.

use std::time::Duration;

use tokio::sync::mpsc;

use bintipad_link::app::{AppContext, ReadingIngestor, SharedContext};
use bintipad_link::domain::models::ConnectionStatus;
use bintipad_link::infrastructure::bluetooth::mock::MockTransport;
use bintipad_link::infrastructure::bluetooth::supervisor::{ConnectionSupervisor, LinkConfig};

async fn connected_stack() -> (
    ConnectionSupervisor<MockTransport>,
    MockTransport,
    SharedContext,
) {
    let mock = MockTransport::new();
    let ctx = AppContext::shared();
    let (events, event_receiver) = mpsc::unbounded_channel();

    let ingestor = ReadingIngestor::new(ctx.clone(), None);
    tokio::spawn(ingestor.clone().run(event_receiver));

    let mut supervisor =
        ConnectionSupervisor::new(mock.clone(), events, LinkConfig::default());
    let device = supervisor.connect().await.expect("mock connect");
    ingestor.register_device(&device).await;

    (supervisor, mock, ctx)
}

async fn settle() {
    // Frame -> pump -> event channel -> ingestor, all on the test runtime.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn json_frame_reaches_latest_reading_slot() {
    let (_supervisor, mock, ctx) = connected_stack().await;

    assert!(mock.inject_frame(br#"{"ph":7.2,"moisture":55,"temperature":36.6,"battery":82}"#));
    settle().await;

    let ctx = ctx.lock().unwrap();
    let reading = ctx.latest_reading.as_ref().expect("reading ingested");
    assert_eq!(reading.ph_text(), "7.2");
    assert_eq!(reading.moisture, 55);
    assert_eq!(reading.temperature_text(), "36.6");
    assert_eq!(reading.battery_level, 82);
}

#[tokio::test]
async fn csv_frame_reaches_latest_reading_slot() {
    let (_supervisor, mock, ctx) = connected_stack().await;

    assert!(mock.inject_frame(b"6.8,40,37.1"));
    settle().await;

    let ctx = ctx.lock().unwrap();
    let reading = ctx.latest_reading.as_ref().expect("reading ingested");
    assert_eq!(reading.ph_text(), "6.8");
    assert_eq!(reading.moisture, 40);
    assert_eq!(reading.temperature_text(), "37.1");
    assert_eq!(reading.battery_level, 0);
}

#[tokio::test]
async fn garbage_frame_leaves_slot_unchanged() {
    let (_supervisor, mock, ctx) = connected_stack().await;

    mock.inject_frame(b"6.8,40,37.1");
    settle().await;

    mock.inject_frame(b"garbage");
    settle().await;

    let ctx = ctx.lock().unwrap();
    let reading = ctx.latest_reading.as_ref().expect("prior reading kept");
    assert_eq!(reading.ph_text(), "6.8");
    // The malformed frame is discarded without dropping the connection.
    assert_eq!(ctx.connection, ConnectionStatus::Connected);
}

#[tokio::test]
async fn readings_overwrite_no_history() {
    let (_supervisor, mock, ctx) = connected_stack().await;

    mock.inject_frame(b"6.8,40,37.1");
    mock.inject_frame(br#"{"ph":7.1,"moisture":52,"temperature":36.4}"#);
    settle().await;

    let ctx = ctx.lock().unwrap();
    let reading = ctx.latest_reading.as_ref().expect("reading ingested");
    assert_eq!(reading.ph_text(), "7.1");
    assert_eq!(reading.moisture, 52);
}

#[tokio::test]
async fn platform_drop_propagates_to_app_state() {
    let (supervisor, mock, ctx) = connected_stack().await;

    mock.drop_link();
    settle().await;

    assert_eq!(supervisor.status(), ConnectionStatus::Disconnected);
    let ctx = ctx.lock().unwrap();
    assert_eq!(ctx.connection, ConnectionStatus::Disconnected);
    assert!(!ctx.device.as_ref().expect("device record kept").connected);
}

#[tokio::test]
async fn explicit_disconnect_updates_device_record() {
    let (mut supervisor, _mock, ctx) = connected_stack().await;

    supervisor.disconnect().await;
    settle().await;

    let ctx = ctx.lock().unwrap();
    assert_eq!(ctx.connection, ConnectionStatus::Disconnected);
    let device = ctx.device.as_ref().expect("device record kept");
    assert!(!device.connected);
    assert_eq!(device.display_name, "BintiPad-01");
}
