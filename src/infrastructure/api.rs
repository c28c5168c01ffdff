//! Client for the Binti backend REST API.
//!
//! The ingestion path treats this as an opaque, best-effort boundary: every
//! failure here is logged by the caller and never stalls the sensor stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::domain::models::SensorReading;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// A device row as the backend stores it.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub device_name: Option<String>,
    pub connection_status: Option<String>,
    #[serde(default, deserialize_with = "flexible_f64_opt")]
    pub battery_level: Option<f64>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

/// A persisted sensor reading as the backend returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadingRecord {
    pub reading_timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "flexible_f64_opt")]
    pub ph_level: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64_opt")]
    pub moisture_level: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64_opt")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64_opt")]
    pub flow_rate: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64_opt")]
    pub volume_ml: Option<f64>,
}

/// Postgres NUMERIC columns arrive as JSON strings; accept both shapes.
fn flexible_f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<NumberOrText>::deserialize(deserializer)? {
        Some(NumberOrText::Number(n)) => Some(n),
        Some(NumberOrText::Text(s)) => s.parse().ok(),
        None => None,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectDeviceBody<'a> {
    device_id: &'a str,
    device_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewReadingBody {
    ph_level: f64,
    moisture_level: i64,
    temperature: f64,
    flow_rate: Option<f64>,
    volume_ml: Option<f64>,
}

#[derive(Deserialize)]
struct DevicesEnvelope {
    devices: Vec<DeviceRecord>,
}

#[derive(Deserialize)]
struct DeviceEnvelope {
    device: DeviceRecord,
}

#[derive(Deserialize)]
struct ReadingEnvelope {
    reading: ReadingRecord,
}

#[derive(Deserialize)]
struct ReadingsEnvelope {
    readings: Vec<ReadingRecord>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<String>,
}

/// Thin typed client over the backend's `/devices` routes.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<ErrorEnvelope>()
            .await
            .ok()
            .and_then(|e| e.error)
            .unwrap_or_else(|| "request failed".to_string());
        Err(ApiError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    /// Devices paired to the authenticated user.
    pub async fn list_devices(&self) -> Result<Vec<DeviceRecord>, ApiError> {
        let response = self.request(reqwest::Method::GET, "/devices").send().await?;
        let envelope: DevicesEnvelope = Self::check(response).await?.json().await?;
        Ok(envelope.devices)
    }

    /// Record a successful pairing (creates the device row on first contact).
    pub async fn connect_device(
        &self,
        device_id: &str,
        device_name: &str,
    ) -> Result<DeviceRecord, ApiError> {
        let response = self
            .request(reqwest::Method::POST, "/devices/connect")
            .json(&ConnectDeviceBody {
                device_id,
                device_name,
            })
            .send()
            .await?;
        let envelope: DeviceEnvelope = Self::check(response).await?.json().await?;
        Ok(envelope.device)
    }

    /// Mark a device disconnected. The row is kept, never deleted.
    pub async fn disconnect_device(&self, device_id: &str) -> Result<(), ApiError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/devices/disconnect/{device_id}"),
            )
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Persist one reading under its device.
    pub async fn create_device_reading(
        &self,
        reading: &SensorReading,
    ) -> Result<ReadingRecord, ApiError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/devices/{}/readings", reading.device_id),
            )
            .json(&NewReadingBody {
                ph_level: reading.ph,
                moisture_level: reading.moisture,
                temperature: reading.temperature_c,
                flow_rate: reading.flow_rate,
                volume_ml: reading.volume_ml,
            })
            .send()
            .await?;
        let envelope: ReadingEnvelope = Self::check(response).await?.json().await?;
        Ok(envelope.reading)
    }

    /// Most recent persisted readings for a device.
    pub async fn device_readings(
        &self,
        device_id: &str,
        limit: u32,
    ) -> Result<Vec<ReadingRecord>, ApiError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/devices/{device_id}/readings?limit={limit}"),
            )
            .send()
            .await?;
        let envelope: ReadingsEnvelope = Self::check(response).await?.json().await?;
        Ok(envelope.readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_record_accepts_numeric_strings() {
        let record: ReadingRecord = serde_json::from_str(
            r#"{
                "reading_timestamp": "2026-08-30T10:15:00Z",
                "ph_level": "7.2",
                "moisture_level": 55,
                "temperature": "36.6",
                "flow_rate": null,
                "volume_ml": null
            }"#,
        )
        .unwrap();

        assert_eq!(record.ph_level, Some(7.2));
        assert_eq!(record.moisture_level, Some(55.0));
        assert_eq!(record.temperature, Some(36.6));
        assert_eq!(record.flow_rate, None);
    }

    #[test]
    fn new_reading_body_uses_api_field_names() {
        let body = NewReadingBody {
            ph_level: 7.2,
            moisture_level: 55,
            temperature: 36.6,
            flow_rate: None,
            volume_ml: Some(12.0),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["phLevel"], 7.2);
        assert_eq!(json["moistureLevel"], 55);
        assert_eq!(json["temperature"], 36.6);
        assert_eq!(json["volumeMl"], 12.0);
    }
}
