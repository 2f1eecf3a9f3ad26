//! Dump-aligned sensor cache with virtual sensor templates.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use regex::Regex;
use snafu::ResultExt;

use crate::errors::{BadVirtualPatternSnafu, SensorError, SensorResult};

use super::categorical::CategoricalData;
use super::value::{RawSensor, Sample, SensorValue};

/// Per-sensor extraction settings, keyed by sensor name or by a
/// `"*suffix"` wildcard matching every name with that suffix.
#[derive(Debug, Clone, Default)]
pub struct SensorProps {
    /// Extract as run-length encoded categorical data instead of a numeric
    /// series.
    pub categorical: bool,
    /// Value to assume before the first sample; without it a sensor whose
    /// samples all arrive after the first dump falls back to its earliest
    /// sample.
    pub initial_value: Option<SensorValue>,
}

/// A sensor aligned onto the dump grid.
#[derive(Debug, Clone)]
pub enum SensorData {
    /// One value per dump.
    Numeric(Arc<Vec<f64>>),
    /// Runs of constant value over the dump index domain.
    Categorical(Arc<CategoricalData<SensorValue>>),
}

impl SensorData {
    /// Number of dumps covered.
    pub fn len(&self) -> usize {
        match self {
            SensorData::Numeric(values) => values.len(),
            SensorData::Categorical(data) => data.domain_len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Computes a virtual sensor from other cached sensors and the parameters
/// captured from its name.
pub type VirtualSensorFn =
    Arc<dyn Fn(&SensorCache, &HashMap<String, String>) -> SensorResult<SensorData> + Send + Sync>;

/// A family of sensors derived on demand instead of being stored.
///
/// The template names the family with `{param}` placeholders, e.g.
/// `"Antennas/{ant}/az"`; a lookup of `"Antennas/m063/az"` captures
/// `ant = "m063"` and hands it to the compute function. Placeholders match
/// any run of characters except the name separator.
pub struct VirtualSensor {
    pattern: Regex,
    compute: VirtualSensorFn,
}

impl VirtualSensor {
    pub fn new(template: &str, compute: VirtualSensorFn) -> SensorResult<VirtualSensor> {
        let mut pattern = String::from("^");
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            let close = open
                + rest[open..]
                    .find('}')
                    .unwrap_or_else(|| panic!("unclosed placeholder in template {template:?}"));
            pattern.push_str(&regex::escape(&rest[..open]));
            pattern.push_str(&format!("(?P<{}>[^/]+)", &rest[open + 1..close]));
            rest = &rest[close + 1..];
        }
        pattern.push_str(&regex::escape(rest));
        pattern.push('$');
        let pattern = Regex::new(&pattern).context(BadVirtualPatternSnafu {
            pattern: template.to_string(),
        })?;
        Ok(VirtualSensor { pattern, compute })
    }

    /// Captured parameters if `name` belongs to this family.
    fn matches(&self, name: &str) -> Option<HashMap<String, String>> {
        let captures = self.pattern.captures(name)?;
        Some(
            self.pattern
                .capture_names()
                .flatten()
                .filter_map(|param| {
                    captures
                        .name(param)
                        .map(|m| (param.to_string(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}

/// Cache of sensors aligned onto the correlator dump grid.
///
/// Raw samples go in via [`insert_raw`]; the first [`get`] of a sensor
/// extracts it onto the dump timestamps (zero-order hold: each dump takes
/// the last sample at or before its midpoint) and memoises the result.
/// Names that match no stored sensor are tried against the registered
/// virtual sensor templates; a computed virtual sensor is memoised under
/// the requested name, so its computation runs at most once.
///
/// [`insert_raw`]: SensorCache::insert_raw
/// [`get`]: SensorCache::get
pub struct SensorCache {
    timestamps: Arc<Vec<f64>>,
    raw: RwLock<HashMap<String, RawSensor>>,
    extracted: RwLock<HashMap<String, SensorData>>,
    props: HashMap<String, SensorProps>,
    virtuals: Vec<Arc<VirtualSensor>>,
}

impl SensorCache {
    /// A cache over the given dump midpoint timestamps.
    pub fn new(timestamps: Vec<f64>) -> SensorCache {
        SensorCache {
            timestamps: Arc::new(timestamps),
            raw: RwLock::new(HashMap::new()),
            extracted: RwLock::new(HashMap::new()),
            props: HashMap::new(),
            virtuals: Vec::new(),
        }
    }

    /// Register extraction settings for a sensor name or a `"*suffix"`
    /// wildcard.
    pub fn set_props(&mut self, name: impl Into<String>, props: SensorProps) {
        self.props.insert(name.into(), props);
    }

    pub fn add_virtual(&mut self, sensor: VirtualSensor) {
        self.virtuals.push(Arc::new(sensor));
    }

    /// Dump midpoint timestamps the cache aligns onto.
    pub fn timestamps(&self) -> &Arc<Vec<f64>> {
        &self.timestamps
    }

    /// Settings for a sensor: an exact entry wins over wildcard suffix
    /// entries, and among matching wildcards the longest suffix wins;
    /// anything else extracts as numeric.
    pub fn props_for(&self, name: &str) -> SensorProps {
        if let Some(props) = self.props.get(name) {
            return props.clone();
        }
        // Two distinct suffixes of the same length cannot both match, so
        // the longest match is unique.
        self.props
            .iter()
            .filter_map(|(key, props)| {
                key.strip_prefix('*')
                    .filter(|suffix| name.ends_with(suffix))
                    .map(|suffix| (suffix.len(), props))
            })
            .max_by_key(|&(len, _)| len)
            .map(|(_, props)| props.clone())
            .unwrap_or_default()
    }

    /// Store raw samples for a sensor, dropping any stale extraction.
    pub fn insert_raw(&self, name: impl Into<String>, sensor: RawSensor) {
        let name = name.into();
        self.extracted
            .write()
            .expect("extracted map lock poisoned")
            .remove(&name);
        self.raw
            .write()
            .expect("raw map lock poisoned")
            .insert(name, sensor);
    }

    /// Store an already dump-aligned sensor directly.
    pub fn insert(&self, name: impl Into<String>, data: SensorData) {
        self.extracted
            .write()
            .expect("extracted map lock poisoned")
            .insert(name.into(), data);
    }

    /// Raw samples of a stored sensor.
    pub fn get_raw(&self, name: &str) -> SensorResult<RawSensor> {
        self.raw
            .read()
            .expect("raw map lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| SensorError::lookup_failed(name))
    }

    /// The sensor aligned onto the dump grid, extracting and memoising on
    /// first use.
    pub fn get(&self, name: &str) -> SensorResult<SensorData> {
        if let Some(data) = self
            .extracted
            .read()
            .expect("extracted map lock poisoned")
            .get(name)
        {
            return Ok(data.clone());
        }
        let raw = self
            .raw
            .read()
            .expect("raw map lock poisoned")
            .get(name)
            .cloned();
        let data = match raw {
            Some(raw) => self.extract(name, &raw)?,
            None => {
                // Locks are released here: a virtual sensor computation is
                // free to call back into the cache.
                let (sensor, params) = self
                    .virtuals
                    .iter()
                    .find_map(|v| v.matches(name).map(|params| (Arc::clone(v), params)))
                    .ok_or_else(|| SensorError::lookup_failed(name))?;
                log::debug!("computing virtual sensor {name}");
                (sensor.compute)(self, &params)?
            }
        };
        self.extracted
            .write()
            .expect("extracted map lock poisoned")
            .insert(name.to_string(), data.clone());
        Ok(data)
    }

    /// Look up the first resolvable name of `candidates` and memoise it
    /// under `logical`, so later lookups of the logical name are direct
    /// hits. Fails only when no candidate resolves.
    pub fn get_with_fallback(&self, logical: &str, candidates: &[&str]) -> SensorResult<SensorData> {
        if let Some(data) = self
            .extracted
            .read()
            .expect("extracted map lock poisoned")
            .get(logical)
        {
            return Ok(data.clone());
        }
        for (i, candidate) in candidates.iter().enumerate() {
            match self.get(candidate) {
                Ok(data) => {
                    if i > 0 {
                        log::warn!(
                            "sensor {logical}: using fallback {candidate} \
                             (preferred {} unavailable)",
                            candidates[0]
                        );
                    }
                    self.insert(logical, data.clone());
                    return Ok(data);
                }
                Err(err) if err.is_lookup_failure() => continue,
                Err(err) => return Err(err),
            }
        }
        Err(SensorError::lookup_failed(logical))
    }

    /// Align raw samples onto the dump grid per the sensor's props.
    fn extract(&self, name: &str, raw: &RawSensor) -> SensorResult<SensorData> {
        let props = self.props_for(name);
        if raw.is_empty() && props.initial_value.is_none() {
            return Err(SensorError::extract_failed(name, "sensor has no samples"));
        }
        if props.categorical {
            let dense: Vec<SensorValue> = self
                .timestamps
                .iter()
                .map(|&t| hold_at(raw.samples(), t, props.initial_value.as_ref()))
                .collect();
            if dense.is_empty() {
                return Err(SensorError::extract_failed(name, "dump grid is empty"));
            }
            Ok(SensorData::Categorical(Arc::new(CategoricalData::from_dense(dense))))
        } else {
            let values: Vec<f64> = self
                .timestamps
                .iter()
                .map(|&t| {
                    let value = hold_at(raw.samples(), t, props.initial_value.as_ref());
                    value.as_f64().ok_or_else(|| {
                        SensorError::extract_failed(
                            name,
                            format!("non-numeric value {value:?} in numeric sensor"),
                        )
                    })
                })
                .collect::<SensorResult<_>>()?;
            Ok(SensorData::Numeric(Arc::new(values)))
        }
    }
}

/// Zero-order hold: the last sample at or before `t`, the initial value
/// before the first sample, or the earliest sample as a last resort.
fn hold_at(samples: &[Sample], t: f64, initial: Option<&SensorValue>) -> SensorValue {
    let at = samples.partition_point(|s| s.timestamp <= t);
    match at.checked_sub(1) {
        Some(i) => samples[i].value.clone(),
        None => initial
            .cloned()
            .unwrap_or_else(|| samples[0].value.clone()),
    }
}
