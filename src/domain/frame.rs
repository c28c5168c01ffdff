//! Inbound frame decoding.
//!
//! The Smart Pad firmware emits one payload per BLE notification, in one of
//! two shapes depending on firmware revision:
//!
//! - a UTF-8 JSON object: `{"ph":7.2,"moisture":55,"temperature":36.6,"battery":82}`
//!   (the battery key is also accepted as `batteryLevel`), or
//! - minimal CSV text: `"7.2,55,36.6"` with exactly three leading fields
//!   interpreted positionally as pH, moisture, temperature.
//!
//! Both are tolerated without protocol version negotiation. Decoding is pure;
//! malformed frames come back as [`ParseError`] and the caller logs and
//! discards them without dropping the connection.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::models::SensorReading;

/// A frame that failed both decode attempts. Carries the offending text
/// (lossily re-encoded when the bytes were not UTF-8) for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable device frame: {raw:?}")]
pub struct ParseError {
    pub raw: String,
}

/// A successfully decoded frame, tagged by wire shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedFrame {
    /// Rich JSON telemetry frame. The full decoded object is kept so extra
    /// keys (e.g. `rssi`) survive into [`SensorReading::raw`].
    Structured(Value),
    /// Minimal positional CSV frame.
    Delimited {
        ph: f64,
        moisture: i64,
        temperature: f64,
    },
}

/// Keys we understand in a structured frame. Everything else is carried
/// through untouched in the raw payload.
#[derive(Debug, Clone, Default, Deserialize)]
struct StructuredFields {
    ph: Option<f64>,
    moisture: Option<f64>,
    temperature: Option<f64>,
    #[serde(alias = "batteryLevel")]
    battery: Option<f64>,
    #[serde(alias = "flowRate")]
    flow_rate: Option<f64>,
    #[serde(alias = "volumeMl")]
    volume_ml: Option<f64>,
}

/// Decode one notification payload into a tagged frame.
///
/// Attempts, in order: UTF-8 decode, JSON object decode, CSV fallback with at
/// least three comma-separated fields. A JSON value that is not an object
/// (e.g. a bare number) does not count as a structured frame. CSV fields that
/// are not valid numbers default to zero, matching the firmware's original
/// companion app.
pub fn decode(bytes: &[u8]) -> Result<ParsedFrame, ParseError> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => {
            return Err(ParseError {
                raw: String::from_utf8_lossy(bytes).into_owned(),
            })
        }
    };

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if value.is_object() {
            return Ok(ParsedFrame::Structured(value));
        }
    }

    let parts: Vec<&str> = text.split(',').collect();
    if parts.len() >= 3 {
        return Ok(ParsedFrame::Delimited {
            ph: parts[0].trim().parse().unwrap_or(0.0),
            moisture: parts[1].trim().parse::<f64>().unwrap_or(0.0) as i64,
            temperature: parts[2].trim().parse().unwrap_or(0.0),
        });
    }

    Err(ParseError {
        raw: text.to_owned(),
    })
}

/// Round to one decimal place, the precision the pH and temperature sensors
/// actually deliver.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn clamp_battery(value: f64) -> u8 {
    value.clamp(0.0, 100.0) as u8
}

impl SensorReading {
    /// Normalize a decoded frame into a reading attributed to `device_id`.
    ///
    /// Missing structured keys default to zero rather than being treated as
    /// distinguishably absent; the original payload stays available in `raw`.
    pub fn from_frame(device_id: &str, frame: ParsedFrame) -> Self {
        match frame {
            ParsedFrame::Structured(value) => {
                let fields: StructuredFields =
                    serde_json::from_value(value.clone()).unwrap_or_default();
                Self {
                    device_id: device_id.to_owned(),
                    timestamp: Utc::now(),
                    ph: round1(fields.ph.unwrap_or(0.0)),
                    moisture: fields.moisture.unwrap_or(0.0) as i64,
                    temperature_c: round1(fields.temperature.unwrap_or(0.0)),
                    flow_rate: fields.flow_rate,
                    volume_ml: fields.volume_ml,
                    battery_level: clamp_battery(fields.battery.unwrap_or(0.0)),
                    raw: value,
                }
            }
            ParsedFrame::Delimited {
                ph,
                moisture,
                temperature,
            } => Self {
                device_id: device_id.to_owned(),
                timestamp: Utc::now(),
                ph: round1(ph),
                moisture,
                temperature_c: round1(temperature),
                flow_rate: None,
                volume_ml: None,
                battery_level: 0,
                raw: serde_json::json!({
                    "ph": ph,
                    "moisture": moisture,
                    "temperature": temperature,
                }),
            },
        }
    }
}

/// Decode and normalize in one step.
pub fn parse(device_id: &str, bytes: &[u8]) -> Result<SensorReading, ParseError> {
    decode(bytes).map(|frame| SensorReading::from_frame(device_id, frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_frame_with_all_keys() {
        let reading = parse(
            "pad-1",
            br#"{"ph":7.2,"moisture":55,"temperature":36.6,"battery":82}"#,
        )
        .unwrap();

        assert_eq!(reading.ph_text(), "7.2");
        assert_eq!(reading.moisture, 55);
        assert_eq!(reading.temperature_text(), "36.6");
        assert_eq!(reading.battery_level, 82);
        assert_eq!(reading.device_id, "pad-1");
        assert_eq!(reading.raw["battery"], 82);
    }

    #[test]
    fn json_frame_missing_keys_defaults_to_zero() {
        let reading = parse("pad-1", br#"{"moisture":40}"#).unwrap();

        assert_eq!(reading.ph_text(), "0.0");
        assert_eq!(reading.moisture, 40);
        assert_eq!(reading.temperature_text(), "0.0");
        assert_eq!(reading.battery_level, 0);
    }

    #[test]
    fn json_frame_accepts_battery_level_key() {
        let reading = parse("pad-1", br#"{"ph":6.9,"batteryLevel":17}"#).unwrap();
        assert_eq!(reading.battery_level, 17);
    }

    #[test]
    fn json_frame_keeps_unknown_keys_in_raw() {
        let reading = parse("pad-1", br#"{"ph":7.0,"rssi":-61}"#).unwrap();
        assert_eq!(reading.raw["rssi"], -61);
    }

    #[test]
    fn json_frame_carries_flow_and_volume() {
        let reading =
            parse("pad-1", br#"{"ph":7.0,"flowRate":1.5,"volumeMl":12.0}"#).unwrap();
        assert_eq!(reading.flow_rate, Some(1.5));
        assert_eq!(reading.volume_ml, Some(12.0));
    }

    #[test]
    fn one_decimal_rounding() {
        let reading = parse("pad-1", br#"{"ph":7.26,"temperature":36.64}"#).unwrap();
        assert_eq!(reading.ph_text(), "7.3");
        assert_eq!(reading.temperature_text(), "36.6");
    }

    #[test]
    fn csv_frame_positional() {
        let reading = parse("pad-1", b"6.8,40,37.1").unwrap();

        assert_eq!(reading.ph_text(), "6.8");
        assert_eq!(reading.moisture, 40);
        assert_eq!(reading.temperature_text(), "37.1");
        assert_eq!(reading.battery_level, 0);
        assert_eq!(reading.flow_rate, None);
    }

    #[test]
    fn csv_frame_ignores_trailing_fields() {
        let reading = parse("pad-1", b"6.8,40,37.1,82,extra").unwrap();
        assert_eq!(reading.ph_text(), "6.8");
        assert_eq!(reading.moisture, 40);
        assert_eq!(reading.temperature_text(), "37.1");
    }

    #[test]
    fn csv_frame_with_two_fields_is_rejected() {
        let err = decode(b"6.8,40").unwrap_err();
        assert_eq!(err.raw, "6.8,40");
    }

    #[test]
    fn csv_frame_with_garbage_fields_defaults_to_zero() {
        let reading = parse("pad-1", b"a,b,c").unwrap();
        assert_eq!(reading.ph_text(), "0.0");
        assert_eq!(reading.moisture, 0);
        assert_eq!(reading.temperature_text(), "0.0");
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(decode(b"garbage").is_err());
    }

    #[test]
    fn bare_json_number_is_not_a_structured_frame() {
        assert!(decode(b"42").is_err());
    }

    #[test]
    fn non_utf8_is_a_parse_error() {
        assert!(decode(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn decode_tags_frame_shape() {
        assert!(matches!(
            decode(br#"{"ph":7.0}"#).unwrap(),
            ParsedFrame::Structured(_)
        ));
        assert!(matches!(
            decode(b"7.0,50,36.5").unwrap(),
            ParsedFrame::Delimited { .. }
        ));
    }
}
