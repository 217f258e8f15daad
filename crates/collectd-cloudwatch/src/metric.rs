// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::sample::DataSourceType;
use crate::statistics::Statistics;
use derive_more::{Display, Into};

const COUNTER_WRAP_32: f64 = 4_294_967_295.0;
const COUNTER_WRAP_64: f64 = 18_446_744_069_414_584_320.0;

/// Aggregation key of a metric, `plugin-plugin_instance-type-type_instance`.
#[derive(Clone, Debug, Display, Into, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey(String);

impl MetricKey {
    #[must_use]
    pub fn new(plugin: &str, plugin_instance: &str, sample_type: &str, type_instance: &str) -> Self {
        Self(format!(
            "{plugin}-{plugin_instance}-{sample_type}-{type_instance}"
        ))
    }

    /// Key of the one-second bucket this metric falls into in high resolution mode.
    #[must_use]
    pub fn for_second(&self, second: i64) -> Self {
        Self(format!("{}-{}", self.0, second))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Ordered dimension list with unique names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dimensions(Vec<(String, String)>);

impl Dimensions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, keeping its position when the name already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing_value)) => *existing_value = value,
            None => self.0.push((name, value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Dimensions {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut dimensions = Self::new();
        for (name, value) in iter {
            dimensions.insert(name, value);
        }
        dimensions
    }
}

/// Previous reading of a derive or counter data source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CumulativeState {
    pub ds_type: DataSourceType,
    pub interval: f64,
    pub last_update_time: Option<f64>,
    pub last_value: Option<f64>,
}

impl CumulativeState {
    #[must_use]
    pub fn new(ds_type: DataSourceType, interval: f64) -> Self {
        Self {
            ds_type,
            interval,
            last_update_time: None,
            last_value: None,
        }
    }

    /// Per-second rate between the previous reading and this one.
    ///
    /// Returns `None` and only remembers the reading when there is no usable previous one:
    /// the first reading, a reading that is not newer than the last, or one that arrives
    /// after more than two collection intervals. A non-positive interval disables the gap
    /// check.
    pub fn rate(&mut self, value: f64, time: f64) -> Option<f64> {
        let previous = self.last_update_time.zip(self.last_value);
        self.last_update_time = Some(time);
        self.last_value = Some(value);

        let (last_time, last_value) = previous?;
        let elapsed = time - last_time;
        if elapsed <= 0.0 || (self.interval > 0.0 && elapsed > 2.0 * self.interval) {
            return None;
        }

        let mut delta = value - last_value;
        if self.ds_type == DataSourceType::Counter && delta < 0.0 {
            delta += COUNTER_WRAP_32;
            if delta < 0.0 {
                delta += COUNTER_WRAP_64;
            }
        }
        Some(delta / elapsed)
    }

    /// Whether the next reading after `now` can no longer produce a rate from this state.
    #[must_use]
    pub fn is_stale(&self, now: f64) -> bool {
        self.interval > 0.0
            && self
                .last_update_time
                .is_some_and(|last_time| now - last_time > 2.0 * self.interval)
    }
}

/// One CloudWatch metric datum with the statistics aggregated for it so far.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricRecord {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Dimensions,
    pub unit: Option<String>,
    /// Absent means the datum is stamped with the submission time.
    pub timestamp: Option<String>,
    pub statistics: Option<Statistics>,
}

impl MetricRecord {
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        metric_name: impl Into<String>,
        dimensions: Dimensions,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            metric_name: metric_name.into(),
            dimensions,
            unit: None,
            timestamp: None,
            statistics: None,
        }
    }

    pub fn add_value(&mut self, value: f64) {
        match self.statistics.as_mut() {
            Some(statistics) => statistics.add(value),
            None => self.statistics = Some(Statistics::new(value)),
        }
    }

    /// Records that never received a value are not worth submitting.
    #[must_use]
    pub fn has_statistics(&self) -> bool {
        self.statistics.is_some()
    }

    #[must_use]
    pub fn sample_count(&self) -> u64 {
        self.statistics
            .map(|statistics| statistics.sample_count)
            .unwrap_or_default()
    }
}
