// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::aggregator::Aggregator;
use crate::client::MetricsSubmitter;
use crate::errors::Submit;
use tracing::{debug, warn};

/// Outcome of one drain of the aggregation store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub batches_submitted: usize,
    pub batches_failed: usize,
    pub records_submitted: usize,
    pub records_failed: usize,
}

impl FlushReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.batches_failed == 0
    }
}

/// Drains the store batch by batch into a [`MetricsSubmitter`].
pub struct BatchEmitter<'a> {
    submitter: &'a dyn MetricsSubmitter,
    namespace: &'a str,
    batch_size: usize,
}

impl<'a> BatchEmitter<'a> {
    #[must_use]
    pub fn new(submitter: &'a dyn MetricsSubmitter, namespace: &'a str, batch_size: usize) -> Self {
        Self {
            submitter,
            namespace,
            batch_size,
        }
    }

    /// Submits everything in `aggregator`, leaving it empty.
    ///
    /// A failed batch is logged and dropped; the remaining batches are still submitted.
    pub fn drain_and_submit(&self, aggregator: &mut Aggregator) -> FlushReport {
        let mut report = FlushReport::default();
        for batch in aggregator.drain_batches(self.batch_size) {
            match self.submitter.put_metric_data(self.namespace, &batch) {
                Ok(()) => {
                    report.batches_submitted += 1;
                    report.records_submitted += batch.len();
                }
                Err(e) => {
                    self.log_failure(&e);
                    report.batches_failed += 1;
                    report.records_failed += batch.len();
                }
            }
        }
        debug!(
            "Submitted {} records in {} batches, dropped {} records in {} failed batches",
            report.records_submitted,
            report.batches_submitted,
            report.records_failed,
            report.batches_failed
        );
        report
    }

    fn log_failure(&self, error: &Submit) {
        warn!(
            "Could not put metric data using the following endpoint: '{}'. [Error: {}]",
            self.submitter.endpoint(),
            error
        );
        if let Some(request) = error.request() {
            warn!("Request details: '{}'", request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::MetricRecordBuilder;
    use crate::metric::MetricRecord;
    use crate::sample::Sample;
    use reqwest::StatusCode;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    /// Records every batch and fails the ones listed in `fail_calls`.
    #[derive(Default)]
    struct RecordingSubmitter {
        batches: Mutex<Vec<usize>>,
        fail_calls: Vec<usize>,
    }

    impl MetricsSubmitter for RecordingSubmitter {
        fn endpoint(&self) -> &str {
            "http://localhost/"
        }

        fn put_metric_data(&self, _: &str, records: &[MetricRecord]) -> Result<(), Submit> {
            let mut batches = self.batches.lock().expect("lock poisoned");
            let call = batches.len();
            batches.push(records.len());
            if self.fail_calls.contains(&call) {
                return Err(Submit::Status {
                    endpoint: self.endpoint().to_string(),
                    request: format!("Action=PutMetricData&call={call}"),
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                });
            }
            Ok(())
        }
    }

    fn filled(keys: usize) -> Aggregator {
        let mut aggregator = Aggregator::new(MetricRecordBuilder::new("collectd"), false, 2000);
        for i in 0..keys {
            let sample = Sample::new("plugin", "0", "type", i.to_string()).with_values([1.0]);
            aggregator
                .upsert(&sample.metric_key(), &sample)
                .expect("upsert failed");
        }
        aggregator
    }

    #[test]
    fn test_batch_size_law() {
        let submitter = RecordingSubmitter::default();
        let mut aggregator = filled(41);
        let report = BatchEmitter::new(&submitter, "collectd", 20).drain_and_submit(&mut aggregator);
        assert_eq!(*submitter.batches.lock().expect("lock poisoned"), vec![20, 20, 1]);
        assert_eq!(report.batches_submitted, 3);
        assert_eq!(report.records_submitted, 41);
        assert!(report.is_success());
        assert!(aggregator.is_empty());
    }

    #[test]
    fn test_empty_store_submits_nothing() {
        let submitter = RecordingSubmitter::default();
        let mut aggregator = filled(0);
        let report = BatchEmitter::new(&submitter, "collectd", 20).drain_and_submit(&mut aggregator);
        assert_eq!(report, FlushReport::default());
        assert!(submitter.batches.lock().expect("lock poisoned").is_empty());
    }

    #[test]
    #[traced_test]
    fn test_failed_batch_does_not_stop_drain() {
        let submitter = RecordingSubmitter {
            fail_calls: vec![0],
            ..Default::default()
        };
        let mut aggregator = filled(30);
        let report = BatchEmitter::new(&submitter, "collectd", 20).drain_and_submit(&mut aggregator);
        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.records_failed, 20);
        assert_eq!(report.batches_submitted, 1);
        assert_eq!(report.records_submitted, 10);
        assert!(!report.is_success());
        assert!(aggregator.is_empty());
        assert!(logs_contain(
            "Could not put metric data using the following endpoint: 'http://localhost/'"
        ));
        assert!(logs_contain("Request details: 'Action=PutMetricData&call=0'"));
    }
}
