//! Scripted in-memory [`Transport`] for exercising the supervisor and the
//! ingestion path without a radio.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::infrastructure::bluetooth::transport::{
    DeviceHandle, LinkEvent, Transport, TransportError,
};

struct MockState {
    supported: bool,
    cancel_picker: bool,
    /// Number of upcoming `open` calls that fail with `ConnectionFailed`.
    open_failures: u32,
    devices: Vec<DeviceHandle>,
    open_attempts: u32,
    writes: Vec<Vec<u8>>,
    link: Option<mpsc::UnboundedSender<LinkEvent>>,
}

/// Cheap to clone; all clones share one scripted state, so a test can keep a
/// handle while the supervisor owns the transport.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                supported: true,
                cancel_picker: false,
                open_failures: 0,
                devices: vec![DeviceHandle {
                    id: "c0:ffee:00:00:01".to_string(),
                    name: "BintiPad-01".to_string(),
                    rssi: Some(-58),
                }],
                open_attempts: 0,
                writes: Vec::new(),
                link: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn unsupported(self) -> Self {
        self.lock().supported = false;
        self
    }

    pub fn with_cancelled_picker(self) -> Self {
        self.lock().cancel_picker = true;
        self
    }

    /// Fail the next `count` open attempts before allowing success.
    pub fn with_open_failures(self, count: u32) -> Self {
        self.lock().open_failures = count;
        self
    }

    /// Open attempts observed so far, successful or not.
    pub fn open_attempts(&self) -> u32 {
        self.lock().open_attempts
    }

    /// Command frames the supervisor actually wrote to the platform.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Deliver one RX notification payload, as the peripheral would.
    /// Returns false when no link is open.
    pub fn inject_frame(&self, bytes: &[u8]) -> bool {
        match &self.lock().link {
            Some(link) => link.send(LinkEvent::Frame(bytes.to_vec())).is_ok(),
            None => false,
        }
    }

    /// Simulate the platform reporting the peripheral gone.
    pub fn drop_link(&self) {
        if let Some(link) = self.lock().link.take() {
            let _ = link.send(LinkEvent::Dropped);
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    async fn is_supported(&self) -> bool {
        self.lock().supported
    }

    async fn request_device(&mut self, name_prefix: &str) -> Result<DeviceHandle, TransportError> {
        let state = self.lock();
        if state.cancel_picker {
            return Err(TransportError::DeviceNotSelected);
        }
        state
            .devices
            .iter()
            .find(|d| d.name.starts_with(name_prefix))
            .cloned()
            .ok_or(TransportError::DeviceNotSelected)
    }

    async fn open(
        &mut self,
        _handle: &DeviceHandle,
    ) -> Result<mpsc::UnboundedReceiver<LinkEvent>, TransportError> {
        let mut state = self.lock();
        state.open_attempts += 1;
        if state.open_failures > 0 {
            state.open_failures -= 1;
            return Err(TransportError::ConnectionFailed(
                "simulated GATT failure".to_string(),
            ));
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        state.link = Some(sender);
        Ok(receiver)
    }

    async fn write(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.link.is_none() {
            return Err(TransportError::NotConnected);
        }
        state.writes.push(payload.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.lock().link = None;
        Ok(())
    }
}
