//! Turns either upstream response shape into one [`Normalized`] value.
//!
//! The backend answers with either a bare per-second array
//! (`[{ second, max_debris_detected }]`, optionally wrapped as `{ data: [...] }`) or a
//! detection object (`{ human_detected, lat, lon, timestamps, audio_analysis }`).

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct TimelineEntry {
    pub second: f64,
    #[serde(rename = "max_debris_detected")]
    pub count: u32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// A positive detection with a usable position.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DetectionEvent {
    pub coordinates: Coordinates,
    pub timestamps: Vec<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AudioEvent {
    pub timestamp: f64,
    pub speech_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Non-JSON response from backend")]
    NonJson,
    #[error("Unrecognized response shape from backend")]
    UnrecognizedShape,
}

/// The two shapes the backend is known to produce.
#[derive(Debug)]
pub enum UpstreamPayload<'a> {
    Detection(&'a Map<String, Value>),
    Timeline(&'a [Value]),
}

impl<'a> UpstreamPayload<'a> {
    /// `human_detected` presence selects the detection shape; an array or a `data` array
    /// selects the timeline shape.
    pub fn decode(value: &'a Value) -> Result<Self, NormalizeError> {
        match value {
            Value::Object(object) if object.contains_key("human_detected") => {
                Ok(UpstreamPayload::Detection(object))
            }
            Value::Array(items) => Ok(UpstreamPayload::Timeline(items)),
            Value::Object(object) => match object.get("data") {
                Some(Value::Array(items)) => Ok(UpstreamPayload::Timeline(items)),
                _ => Err(NormalizeError::UnrecognizedShape),
            },
            _ => Err(NormalizeError::UnrecognizedShape),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Normalized {
    pub timeline: Vec<TimelineEntry>,
    /// `human_detected` as read; `None` for the timeline shape and for failures.
    pub detected: Option<bool>,
    /// Only present when detected with finite coordinates.
    pub detection: Option<DetectionEvent>,
    pub audio: Vec<AudioEvent>,
    pub error: Option<NormalizeError>,
}

impl Normalized {
    pub fn failed(error: NormalizeError) -> Self {
        Normalized {
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Parses a raw response body, falling back to the failure state on invalid JSON.
pub fn normalize_body(raw: &str) -> Normalized {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => normalize(&value),
        Err(e) => {
            warn!("non-json response from backend ({e}): {raw}");
            Normalized::failed(NormalizeError::NonJson)
        }
    }
}

pub fn normalize(value: &Value) -> Normalized {
    match UpstreamPayload::decode(value) {
        Ok(UpstreamPayload::Detection(object)) => normalize_detection(object),
        Ok(UpstreamPayload::Timeline(items)) => Normalized {
            timeline: items.iter().filter_map(timeline_record).collect(),
            ..Default::default()
        },
        Err(e) => {
            warn!("{e}: {value}");
            Normalized::failed(e)
        }
    }
}

fn normalize_detection(object: &Map<String, Value>) -> Normalized {
    let detected = match object.get("human_detected") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    };
    let lat = object.get("lat").and_then(parse_float);
    let lon = object.get("lon").and_then(parse_float);

    let timestamps: Vec<f64> = match object.get("timestamps") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_f64)
            .filter(|x| x.is_finite() && *x >= 0.0)
            .collect(),
        _ => vec![],
    };
    let count = u32::from(detected);
    let timeline = timestamps
        .iter()
        .map(|second| TimelineEntry {
            second: *second,
            count,
        })
        .collect();

    let audio = match object.get("audio_analysis") {
        Some(Value::Array(items)) => items.iter().filter_map(audio_record).collect(),
        _ => vec![],
    };

    let detection = match (lat, lon) {
        (Some(lat), Some(lon)) if detected => Some(DetectionEvent {
            coordinates: Coordinates { lat, lon },
            timestamps,
        }),
        _ => None,
    };

    Normalized {
        timeline,
        detected: Some(detected),
        detection,
        audio,
        error: None,
    }
}

fn timeline_record(item: &Value) -> Option<TimelineEntry> {
    let second = item.get("second")?.as_f64()?;
    if !second.is_finite() || second < 0.0 {
        return None;
    }
    let count = item
        .get("max_debris_detected")
        .and_then(to_number)
        .filter(|x| *x > 0.0)
        .map(|x| x as u32)
        .unwrap_or(0);
    Some(TimelineEntry { second, count })
}

fn audio_record(item: &Value) -> Option<AudioEvent> {
    let timestamp = item.get("timestamp").and_then(to_number)?;
    let speech_ratio = item.get("speech_ratio").and_then(to_number)?;
    let label = match item.get("label") {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };
    Some(AudioEvent {
        timestamp,
        speech_ratio,
        label,
    })
}

/// Strict numeric coercion: numbers, numeric strings, booleans and null.
fn to_number(value: &Value) -> Option<f64> {
    let out = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Null => 0.0,
        _ => return None,
    };
    out.is_finite().then_some(out)
}

/// Lenient coercion for coordinates: a string only needs a leading decimal number.
fn parse_float(value: &Value) -> Option<f64> {
    let out = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => leading_float(s.trim_start())?,
        _ => return None,
    };
    out.is_finite().then_some(out)
}

fn leading_float(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || &s[digits_start..end] == "." {
        return None;
    }
    // optional exponent, only taken when followed by digits
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    s[..end].parse().ok()
}
