// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Running aggregate of the values folded into one metric record.
///
/// A `Statistics` only exists once a first value was seen, so `sample_count` is
/// never zero and `min <= sum / sample_count <= max` always holds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Statistics {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub sample_count: u64,
}

impl Statistics {
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self {
            min: value,
            max: value,
            sum: value,
            sample_count: 1,
        }
    }

    pub fn add(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.sample_count += 1;
    }

    #[must_use]
    pub fn average(&self) -> f64 {
        self.sum / self.sample_count as f64
    }
}
