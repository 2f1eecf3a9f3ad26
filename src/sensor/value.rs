//! Raw sensor samples and their dynamically typed values.

use std::fmt;

/// A single sensor reading.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl SensorValue {
    /// Numeric view of the value, or `None` for strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SensorValue::Bool(b) => Some(f64::from(u8::from(*b))),
            SensorValue::Int(i) => Some(*i as f64),
            SensorValue::Float(f) => Some(*f),
            SensorValue::Str(_) => None,
        }
    }
}

impl From<bool> for SensorValue {
    fn from(v: bool) -> SensorValue {
        SensorValue::Bool(v)
    }
}

impl From<i64> for SensorValue {
    fn from(v: i64) -> SensorValue {
        SensorValue::Int(v)
    }
}

impl From<f64> for SensorValue {
    fn from(v: f64) -> SensorValue {
        SensorValue::Float(v)
    }
}

impl From<&str> for SensorValue {
    fn from(v: &str) -> SensorValue {
        SensorValue::Str(v.to_string())
    }
}

impl From<String> for SensorValue {
    fn from(v: String) -> SensorValue {
        SensorValue::Str(v)
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Bool(v) => write!(f, "{v}"),
            SensorValue::Int(v) => write!(f, "{v}"),
            SensorValue::Float(v) => write!(f, "{v}"),
            SensorValue::Str(v) => write!(f, "{v}"),
        }
    }
}

/// One timestamped sensor reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub value: SensorValue,
}

impl Sample {
    pub fn new(timestamp: f64, value: impl Into<SensorValue>) -> Sample {
        Sample {
            timestamp,
            value: value.into(),
        }
    }
}

/// An irregular time series of samples for one sensor, kept sorted by
/// timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSensor {
    samples: Vec<Sample>,
}

impl RawSensor {
    pub fn new() -> RawSensor {
        RawSensor::default()
    }

    /// Build a series from samples in any order.
    pub fn from_samples(mut samples: Vec<Sample>) -> RawSensor {
        samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        RawSensor { samples }
    }

    /// Insert a sample, keeping the series sorted. Samples with equal
    /// timestamps keep their insertion order.
    pub fn push(&mut self, sample: Sample) {
        let at = self
            .samples
            .partition_point(|s| s.timestamp.total_cmp(&sample.timestamp).is_le());
        self.samples.insert(at, sample);
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
