// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::aggregator::Aggregator;
use crate::builder::MetricRecordBuilder;
use crate::client::MetricsSubmitter;
use crate::config::PluginConfig;
use crate::constants::MAX_METRICS_PER_PUT_REQUEST;
use crate::dataset::DatasetResolver;
use crate::emitter::{BatchEmitter, FlushReport};
use crate::errors;
use crate::metric::MetricKey;
use crate::sample::Sample;
use crate::scheduler::FlushScheduler;
use crate::util::unix_now;
use crate::whitelist::MetricFilter;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Aggregates samples for the current flush window and submits them once it elapses.
///
/// Every ingestion call checks the window first and flushes synchronously, submissions
/// included, before folding the new sample. Producers calling concurrently wait on the
/// same lock.
pub struct Flusher {
    state: Mutex<FlusherState>,
    submitter: Arc<dyn MetricsSubmitter>,
    filter: Arc<dyn MetricFilter>,
    datasets: Arc<dyn DatasetResolver>,
    namespace: String,
    high_resolution: bool,
    debug: bool,
}

struct FlusherState {
    aggregator: Aggregator,
    scheduler: FlushScheduler,
}

pub struct FlusherConfig {
    pub plugin_config: PluginConfig,
    pub submitter: Arc<dyn MetricsSubmitter>,
    pub filter: Arc<dyn MetricFilter>,
    pub datasets: Arc<dyn DatasetResolver>,
}

impl Flusher {
    #[must_use]
    pub fn new(config: FlusherConfig) -> Self {
        Self::with_start_time(config, unix_now())
    }

    /// Creates a flusher whose first window starts at `now`.
    #[must_use]
    pub fn with_start_time(config: FlusherConfig, now: f64) -> Self {
        let plugin_config = &config.plugin_config;
        let high_resolution = plugin_config.enable_high_resolution_metrics;
        let aggregator = Aggregator::new(
            MetricRecordBuilder::from_config(plugin_config),
            high_resolution,
            plugin_config.max_metrics_to_aggregate(),
        );
        let scheduler =
            FlushScheduler::new(plugin_config.flush_interval_in_seconds, high_resolution, now);
        Flusher {
            state: Mutex::new(FlusherState {
                aggregator,
                scheduler,
            }),
            submitter: config.submitter,
            filter: config.filter,
            datasets: config.datasets,
            namespace: plugin_config.namespace.clone(),
            high_resolution,
            debug: plugin_config.debug,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FlusherState> {
        #[allow(clippy::expect_used)]
        let state = self.state.lock().expect("lock poisoned");
        state
    }

    /// Adds a sample received now.
    pub fn add_metric(&self, sample: Sample) {
        self.add_metric_at(sample, unix_now());
    }

    /// Adds a sample, taking `now` as the current time for the flush check.
    pub fn add_metric_at(&self, sample: Sample, now: f64) {
        let mut state = self.lock();
        if state.scheduler.is_flush_time(now) {
            self.flush_locked(&mut state, now);
        }
        for sample in sample.expand(self.datasets.as_ref()) {
            let key = sample.metric_key();
            if self.filter.is_whitelisted(key.as_str()) {
                self.aggregate(&mut state, &key, &sample, now);
            }
        }
    }

    fn aggregate(&self, state: &mut FlusherState, key: &MetricKey, sample: &Sample, now: f64) {
        match state.aggregator.upsert(key, sample) {
            Ok(_) => {}
            Err(errors::Insert::Overflow) if self.high_resolution => {
                debug!("Aggregation store full, flushing before adding {}", key);
                self.flush_locked(state, now);
                if state.aggregator.upsert(key, sample).is_err() {
                    warn!("Batching queue overflow detected. Dropping metric.");
                }
            }
            Err(errors::Insert::Overflow) => {
                warn!("Batching queue overflow detected. Dropping metric.");
            }
        }
    }

    /// Submits everything aggregated so far and starts a new window at `now`.
    pub fn flush_at(&self, now: f64) -> FlushReport {
        let mut state = self.lock();
        self.flush_locked(&mut state, now)
    }

    pub fn flush(&self) -> FlushReport {
        self.flush_at(unix_now())
    }

    fn flush_locked(&self, state: &mut FlusherState, now: f64) -> FlushReport {
        if self.debug && !state.aggregator.is_empty() {
            info!("[debug] flushing metrics {}", state.aggregator.summary());
        }
        state.scheduler.mark_flushed(now);
        state.aggregator.expire_rates(now);
        BatchEmitter::new(
            self.submitter.as_ref(),
            &self.namespace,
            MAX_METRICS_PER_PUT_REQUEST,
        )
        .drain_and_submit(&mut state.aggregator)
    }

    /// Number of metric keys waiting for the next flush.
    #[must_use]
    pub fn pending_metrics(&self) -> usize {
        self.lock().aggregator.len()
    }
}
