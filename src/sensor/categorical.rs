//! Run-length encoded categorical sensor data.

use std::ops::Range;

/// A sequence of dumps partitioned into runs of constant value.
///
/// `events` holds the run boundaries: `events[i]..events[i + 1]` is the
/// extent of run `i` with value `values[i]`. Boundaries are strictly
/// increasing, the first is always 0 and the last is the domain length.
/// Adjacent runs may carry equal values; each boundary is a real sensor
/// event, not merely a change of value.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalData<T> {
    events: Vec<usize>,
    values: Vec<T>,
}

impl<T: Clone + PartialEq> CategoricalData<T> {
    /// Build from explicit boundaries and per-run values.
    ///
    /// Malformed inputs (boundaries not strictly increasing, first boundary
    /// not 0, value count not one less than the boundary count) are
    /// programming errors and fail fast.
    pub fn new(events: Vec<usize>, values: Vec<T>) -> CategoricalData<T> {
        assert!(
            events.len() == values.len() + 1,
            "categorical data needs one more boundary than values"
        );
        assert_eq!(events.first(), Some(&0), "first run must start at 0");
        assert!(
            events.windows(2).all(|w| w[0] < w[1]),
            "run boundaries must be strictly increasing"
        );
        CategoricalData { events, values }
    }

    /// Run-length encode a dense sequence, starting a new run at every
    /// change of value.
    pub fn from_dense<I>(dense: I) -> CategoricalData<T>
    where
        I: IntoIterator<Item = T>,
    {
        let mut events = vec![0];
        let mut values: Vec<T> = Vec::new();
        let mut len = 0;
        for item in dense {
            match values.last() {
                Some(last) if *last == item => {}
                _ => {
                    if !values.is_empty() {
                        events.push(len);
                    }
                    values.push(item);
                }
            }
            len += 1;
        }
        assert!(len > 0, "categorical data cannot be empty");
        events.push(len);
        CategoricalData { events, values }
    }

    /// Number of runs.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of dumps covered.
    pub fn domain_len(&self) -> usize {
        *self.events.last().expect("events is never empty")
    }

    pub fn events(&self) -> &[usize] {
        &self.events
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Value at a single dump index.
    pub fn value_at(&self, index: usize) -> &T {
        assert!(
            index < self.domain_len(),
            "dump index {index} out of bounds for domain of length {}",
            self.domain_len()
        );
        let run = self.events.partition_point(|&e| e <= index) - 1;
        &self.values[run]
    }

    /// Iterate over `(dump_range, value)` per run.
    pub fn iter_runs(&self) -> impl Iterator<Item = (Range<usize>, &T)> {
        self.events
            .windows(2)
            .zip(&self.values)
            .map(|(w, v)| (w[0]..w[1], v))
    }

    /// Expand back to one value per dump.
    pub fn dense(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.domain_len());
        for (range, value) in self.iter_runs() {
            out.extend(range.map(|_| value.clone()));
        }
        out
    }

    /// Snap every run boundary to the nearest of the given boundaries.
    ///
    /// `boundaries` must be sorted. The first run stays pinned at 0 and the
    /// domain length never changes. A boundary equidistant between two
    /// candidates snaps to the earlier one. When snapping makes a run start
    /// at or before the previous run's (possibly also snapped) start, the
    /// later run wins and the overshadowed runs disappear. Aligning twice
    /// with the same boundaries is a no-op the second time.
    pub fn align(&self, boundaries: &[usize]) -> CategoricalData<T> {
        let domain = self.domain_len();
        let mut starts: Vec<usize> = Vec::with_capacity(self.values.len());
        let mut values: Vec<T> = Vec::with_capacity(self.values.len());
        for (i, value) in self.values.iter().enumerate() {
            let snapped = if i == 0 {
                0
            } else {
                nearest(self.events[i], boundaries)
            };
            if snapped >= domain {
                continue;
            }
            while let Some(&last) = starts.last() {
                if snapped <= last {
                    starts.pop();
                    values.pop();
                } else {
                    break;
                }
            }
            starts.push(snapped);
            values.push(value.clone());
        }
        starts.push(domain);
        CategoricalData::new(starts, values)
    }

    /// Split runs at each given boundary that is not already an event,
    /// duplicating the containing run's value. Boundaries outside the open
    /// domain interval are ignored.
    pub fn add_unmatched(&mut self, boundaries: &[usize]) {
        for &b in boundaries {
            if b == 0 || b >= self.domain_len() {
                continue;
            }
            let at = self.events.partition_point(|&e| e < b);
            if self.events.get(at) == Some(&b) {
                continue;
            }
            self.events.insert(at, b);
            self.values.insert(at, self.values[at - 1].clone());
        }
    }

    /// Insert a sensor event at `event` with the given value, overriding
    /// the data from there to the next event. An event at an existing
    /// boundary replaces that run's value.
    pub fn add(&mut self, event: usize, value: T) {
        assert!(
            event < self.domain_len(),
            "event {event} out of bounds for domain of length {}",
            self.domain_len()
        );
        let at = self.events.partition_point(|&e| e < event);
        if self.events.get(at) == Some(&event) {
            self.values[at] = value;
        } else {
            self.events.insert(at, event);
            self.values.insert(at, value);
        }
    }

    /// Remove every run with the given value, extending the preceding run
    /// over the gap. A leading removed run is absorbed by the run that
    /// follows it. Removing a value that covers everything is a no-op, as
    /// is removing an absent value.
    pub fn remove(&mut self, target: &T) {
        let domain = self.domain_len();
        let mut starts: Vec<usize> = Vec::new();
        let mut values: Vec<T> = Vec::new();
        for (i, value) in self.values.iter().enumerate() {
            if value == target {
                continue;
            }
            starts.push(self.events[i]);
            values.push(value.clone());
        }
        if values.is_empty() {
            return;
        }
        starts[0] = 0;
        starts.push(domain);
        self.events = starts;
        self.values = values;
    }
}

/// Nearest boundary to `x`, snapping to the earlier candidate on a tie.
/// Returns `x` unchanged when there are no boundaries.
fn nearest(x: usize, boundaries: &[usize]) -> usize {
    if boundaries.is_empty() {
        return x;
    }
    let at = boundaries.partition_point(|&b| b < x);
    match (at.checked_sub(1).map(|i| boundaries[i]), boundaries.get(at)) {
        (Some(lo), Some(&hi)) => {
            if x - lo <= hi - x {
                lo
            } else {
                hi
            }
        }
        (Some(lo), None) => lo,
        (None, Some(&hi)) => hi,
        (None, None) => unreachable!("boundaries checked non-empty"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invariant_holds<T: Clone + PartialEq>(data: &CategoricalData<T>) {
        assert_eq!(data.events().len(), data.values().len() + 1);
        assert_eq!(data.events().first(), Some(&0));
        assert!(data.events().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn dense_round_trips_through_runs() {
        let data = CategoricalData::from_dense(["a", "a", "b", "b", "b", "a"]);
        invariant_holds(&data);
        assert_eq!(data.events(), &[0, 2, 5, 6]);
        assert_eq!(data.values(), &["a", "b", "a"]);
        assert_eq!(data.dense(), vec!["a", "a", "b", "b", "b", "a"]);
        assert_eq!(*data.value_at(4), "b");
    }

    #[test]
    fn align_snaps_to_reference_boundaries() {
        // Short lead-in and lead-out runs around a track: the track start
        // snaps forward to 4 and the trailing slew (equidistant between 4
        // and 10) snaps back onto the track start and overrides it.
        let data = CategoricalData::new(vec![0, 3, 7, 10], vec!["slew", "track", "slew"]);
        let aligned = data.align(&[0, 4, 10]);
        invariant_holds(&aligned);
        assert_eq!(aligned.events(), &[0, 4, 10]);
        assert_eq!(aligned.values(), &["slew", "slew"]);
        // Aligning again changes nothing.
        assert_eq!(aligned.align(&[0, 4, 10]), aligned);
    }

    #[test]
    fn align_drops_runs_snapped_past_the_end() {
        let data = CategoricalData::new(vec![0, 9, 10], vec!["track", "slew"]);
        let aligned = data.align(&[0, 10]);
        invariant_holds(&aligned);
        assert_eq!(aligned.events(), &[0, 10]);
        assert_eq!(aligned.values(), &["track"]);
    }

    #[test]
    fn add_unmatched_splits_without_changing_dense_view() {
        let mut data = CategoricalData::from_dense(["x", "x", "x", "y", "y", "y"]);
        let dense = data.dense();
        data.add_unmatched(&[0, 2, 3, 6]);
        invariant_holds(&data);
        assert_eq!(data.events(), &[0, 2, 3, 6]);
        assert_eq!(data.dense(), dense);
    }

    #[test]
    fn add_overrides_until_next_event() {
        let mut data = CategoricalData::from_dense(["a", "a", "a", "a"]);
        data.add(1, "b");
        invariant_holds(&data);
        assert_eq!(data.dense(), vec!["a", "b", "b", "b"]);
        // Adding at an existing boundary replaces that run's value.
        data.add(1, "c");
        assert_eq!(data.dense(), vec!["a", "c", "c", "c"]);
    }

    #[test]
    fn remove_extends_the_preceding_run() {
        let mut data = CategoricalData::new(vec![0, 2, 4, 6], vec!["track", "slew", "track"]);
        data.remove(&"slew");
        invariant_holds(&data);
        assert_eq!(data.events(), &[0, 4, 6]);
        assert_eq!(data.values(), &["track", "track"]);
    }

    #[test]
    fn remove_leading_run_is_absorbed_forward() {
        let mut data = CategoricalData::new(vec![0, 2, 6], vec!["slew", "track"]);
        data.remove(&"slew");
        invariant_holds(&data);
        assert_eq!(data.events(), &[0, 6]);
        assert_eq!(data.values(), &["track"]);
    }

    #[test]
    fn remove_absent_or_total_value_is_a_no_op() {
        let mut data = CategoricalData::from_dense(["a", "a"]);
        let before = data.clone();
        data.remove(&"missing");
        assert_eq!(data, before);
        data.remove(&"a");
        assert_eq!(data, before);
    }

    #[test]
    #[should_panic(expected = "strictly increasing")]
    fn unsorted_boundaries_fail_fast() {
        CategoricalData::new(vec![0, 5, 3], vec!["a", "b"]);
    }
}
