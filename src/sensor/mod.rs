//! Instrument telemetry: raw sensor series, run-length encoded categorical
//! data and the dump-aligned sensor cache.
//!
//! Telemetry arrives as irregularly timestamped samples per named sensor.
//! The [`SensorCache`] aligns those samples onto the correlator dump grid
//! once per sensor and memoises the result, so repeated lookups are cheap.
//! Discrete sensors (observation targets, scan states) come out as
//! [`CategoricalData`], continuous ones as a plain numeric series.

mod cache;
mod categorical;
mod value;

pub use cache::{SensorCache, SensorData, SensorProps, VirtualSensor, VirtualSensorFn};
pub use categorical::CategoricalData;
pub use value::{RawSensor, Sample, SensorValue};
