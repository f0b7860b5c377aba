//! Sink-side representation of one runtime snapshot
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::stats::Fields;

/// Timestamp precision used when encoding points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Precision {
    #[default]
    #[serde(rename = "ns")]
    Nanoseconds,
    #[serde(rename = "us")]
    Microseconds,
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "s")]
    Seconds,
}

impl Precision {
    /// Query parameter understood by the 1.x `/write` endpoint
    pub fn v1_param(&self) -> &'static str {
        match self {
            Precision::Nanoseconds => "n",
            Precision::Microseconds => "u",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
        }
    }

    /// Query parameter understood by the 2.x `/api/v2/write` endpoint
    pub fn v2_param(&self) -> &'static str {
        match self {
            Precision::Nanoseconds => "ns",
            Precision::Microseconds => "us",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
        }
    }

    /// Timestamp in this precision's units since the epoch
    pub fn timestamp(&self, at: &DateTime<Utc>) -> i64 {
        match self {
            Precision::Nanoseconds => at
                .timestamp_nanos_opt()
                .unwrap_or_else(|| at.timestamp_micros().saturating_mul(1_000)),
            Precision::Microseconds => at.timestamp_micros(),
            Precision::Milliseconds => at.timestamp_millis(),
            Precision::Seconds => at.timestamp(),
        }
    }
}

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

/// Measurement, tags, fields and timestamp for one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Build the point for a snapshot
    pub fn from_fields(measurement: impl Into<String>, fields: &Fields, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: fields.tags(),
            fields: fields.values(),
            timestamp,
        }
    }

    /// Encode as one line of InfluxDB line protocol.
    ///
    /// Non-finite floats are skipped since the store rejects them. Returns
    /// `None` when no field survives.
    pub fn to_line_protocol(&self, precision: Precision) -> Option<String> {
        let mut line = String::with_capacity(64 + self.fields.len() * 32);
        escape_into(&mut line, &self.measurement, &[',', ' ']);

        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            line.push(',');
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            escape_into(&mut line, value, &[',', '=', ' ']);
        }

        let mut first = true;
        for (key, value) in &self.fields {
            if let FieldValue::Float(f) = value {
                if !f.is_finite() {
                    continue;
                }
            }
            line.push(if first { ' ' } else { ',' });
            first = false;
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            match value {
                FieldValue::Integer(i) => {
                    let _ = write!(line, "{}i", i);
                }
                FieldValue::Float(f) => {
                    let _ = write!(line, "{}", f);
                }
                FieldValue::String(s) => {
                    line.push('"');
                    escape_into(&mut line, s, &['"', '\\']);
                    line.push('"');
                }
            }
        }

        if first {
            return None;
        }

        let _ = write!(line, " {}", precision.timestamp(&self.timestamp));
        Some(line)
    }
}

/// Encode a batch, one point per line
pub fn encode_batch(points: &[Point], precision: Precision) -> String {
    let mut body = String::new();
    for line in points.iter().filter_map(|p| p.to_line_protocol(precision)) {
        body.push_str(&line);
        body.push('\n');
    }
    body
}

fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    for c in raw.chars() {
        if c == '\\' && !special.contains(&'\\') {
            out.push(c);
            continue;
        }
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}
