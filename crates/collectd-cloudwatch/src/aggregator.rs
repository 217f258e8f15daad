// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The aggregation store: metric records of the current flush window, by metric key.

use crate::builder::MetricRecordBuilder;
use crate::constants::MAX_REPORTED_KEYS;
use crate::errors;
use crate::metric::{CumulativeState, MetricKey, MetricRecord};
use crate::sample::{Sample, SampleValue};
use hashbrown::{HashMap, HashSet};
use std::collections::VecDeque;
use std::fmt::Write;
use tracing::warn;

type FnvHashMap<K, V> = HashMap<K, V, fnv::FnvBuildHasher>;
type FnvHashSet<K> = HashSet<K, fnv::FnvBuildHasher>;

pub struct Aggregator {
    builder: MetricRecordBuilder,
    high_resolution: bool,
    max_keys: usize,
    map: FnvHashMap<MetricKey, Vec<MetricRecord>>,
    /// Last reading of every derive and counter metric, by base key. Survives flushes.
    rates: FnvHashMap<MetricKey, CumulativeState>,
    warned: FnvHashSet<MetricKey>,
}

impl Aggregator {
    /// Create a new instance of `Aggregator`
    ///
    /// At most `max_keys` distinct keys are held at a time. In high resolution mode every
    /// second of a metric is aggregated under its own key.
    #[must_use]
    pub fn new(builder: MetricRecordBuilder, high_resolution: bool, max_keys: usize) -> Self {
        Aggregator {
            builder,
            high_resolution,
            max_keys,
            map: FnvHashMap::with_capacity_and_hasher(max_keys, fnv::FnvBuildHasher::default()),
            rates: FnvHashMap::default(),
            warned: FnvHashSet::default(),
        }
    }

    /// Folds the values of `sample` into the records stored for `key`, creating them when the
    /// key is new.
    ///
    /// Derive and counter values are folded as the rate since the previous reading of `key`,
    /// which may have arrived in an earlier window or second. A reading without a usable
    /// previous one only seeds the rate.
    ///
    /// Returns the number of values that were dropped because they are not finite numbers.
    /// A new key is only stored when at least one value could be folded.
    ///
    /// # Errors
    /// Returns [`errors::Insert::Overflow`] when `key` is new, there is something to fold and
    /// the store is full. Neither the store nor the rate state is changed then.
    pub fn upsert(&mut self, key: &MetricKey, sample: &Sample) -> Result<usize, errors::Insert> {
        let ds_type = sample.ds_type();
        let mut state = ds_type.is_cumulative().then(|| {
            self.rates.get(key).map_or_else(
                || CumulativeState::new(ds_type, sample.interval),
                |previous| CumulativeState {
                    ds_type,
                    interval: sample.interval,
                    ..*previous
                },
            )
        });

        let mut rejected = 0;
        let mut values = Vec::with_capacity(sample.values.len());
        for value in &sample.values {
            match (value.as_numeric(), state.as_mut()) {
                (None, _) => rejected += 1,
                (Some(value), None) => values.push(value),
                (Some(value), Some(state)) => values.extend(state.rate(value, sample.time)),
            }
        }

        if rejected > 0 {
            self.report_invalid(key, &sample.values);
        }

        let storage_key = if self.high_resolution {
            key.for_second(sample.second())
        } else {
            key.clone()
        };
        if let Some(records) = self.map.get_mut(&storage_key) {
            fold(records, &values);
        } else if !values.is_empty() {
            if self.map.len() >= self.max_keys {
                return Err(errors::Insert::Overflow);
            }
            let second = self.high_resolution.then(|| sample.second());
            let mut records = self.builder.build(sample, second);
            fold(&mut records, &values);
            self.map.insert(storage_key, records);
        }

        if let Some(state) = state {
            self.rates.insert(key.clone(), state);
        }
        Ok(rejected)
    }

    fn report_invalid(&mut self, key: &MetricKey, values: &[SampleValue]) {
        if self.warned.len() >= MAX_REPORTED_KEYS && !self.warned.contains(key) {
            self.warned.clear();
        }
        if self.warned.insert(key.clone()) {
            warn!(
                "Invalid value(s) for metric {}: [{}]",
                key,
                join_values(values)
            );
        }
    }

    /// Forgets the rate state of metrics whose next reading could not produce a rate anymore.
    pub fn expire_rates(&mut self, now: f64) {
        self.rates.retain(|_, state| !state.is_stale(now));
    }

    /// Number of derive and counter metrics with a remembered reading.
    #[must_use]
    pub fn tracked_rates(&self) -> usize {
        self.rates.len()
    }

    #[must_use]
    pub fn get(&self, key: &MetricKey) -> Option<&[MetricRecord]> {
        self.map.get(key).map(Vec::as_slice)
    }

    #[must_use]
    pub fn contains_key(&self, key: &MetricKey) -> bool {
        self.map.contains_key(key)
    }

    /// Whether a non-numeric value was already reported for `key`.
    ///
    /// Reported keys are remembered until [`MAX_REPORTED_KEYS`] of them are, then the set
    /// starts over.
    #[must_use]
    pub fn was_warned(&self, key: &MetricKey) -> bool {
        self.warned.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.max_keys
    }

    /// `key[sample_count]` for every stored key, as logged before a flush in debug mode.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        for (key, records) in &self.map {
            let sample_count = records.first().map_or(0, MetricRecord::sample_count);
            let _ = write!(summary, "{key}[{sample_count}] ");
        }
        summary
    }

    /// Drains the store into batches of at most `batch_size` records.
    ///
    /// Keys are removed as the iterator reaches them, so dropping it early keeps the
    /// remaining keys in the store. Records that never received a value are skipped.
    pub fn drain_batches(&mut self, batch_size: usize) -> Batches<'_> {
        Batches {
            entries: Box::new(self.map.extract_if(|_, _| true)),
            pending: VecDeque::new(),
            batch_size: batch_size.max(1),
        }
    }
}

fn fold(records: &mut [MetricRecord], values: &[f64]) {
    for value in values {
        records.iter_mut().for_each(|record| record.add_value(*value));
    }
}

fn join_values(values: &[SampleValue]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Iterator over the batches of a draining [`Aggregator`].
pub struct Batches<'a> {
    entries: Box<dyn Iterator<Item = (MetricKey, Vec<MetricRecord>)> + 'a>,
    pending: VecDeque<MetricRecord>,
    batch_size: usize,
}

impl Iterator for Batches<'_> {
    type Item = Vec<MetricRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            if let Some(record) = self.pending.pop_front() {
                batch.push(record);
                continue;
            }
            match self.entries.next() {
                Some((_, records)) => self
                    .pending
                    .extend(records.into_iter().filter(MetricRecord::has_statistics)),
                None => break,
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}
