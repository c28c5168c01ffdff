//! Infrastructure layer: platform Bluetooth, the persistence API client,
//! and logging.

pub mod api;
pub mod bluetooth;
pub mod logging;
