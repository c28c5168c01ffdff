//! Domain layer: data types, frame decoding, and settings.

pub mod frame;
pub mod models;
pub mod settings;
