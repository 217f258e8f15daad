// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// CloudWatch namespace used when the configuration does not set one.
pub const DEFAULT_NAMESPACE: &str = "collectd";

/// Maximum number of metric records sent in a single `PutMetricData` request.
pub const MAX_METRICS_PER_PUT_REQUEST: usize = 20;

/// Maximum number of distinct metric keys aggregated within one flush window.
pub const MAX_METRICS_TO_AGGREGATE: usize = 2000;

/// In high resolution mode every overflow flushes, so one batch worth of keys is enough.
pub const MAX_METRICS_TO_AGGREGATE_HIGH_RESOLUTION: usize = MAX_METRICS_PER_PUT_REQUEST;

pub const DEFAULT_FLUSH_INTERVAL_IN_SECONDS: u64 = 60;

/// Bias applied to the flush check so a window is flushed at, or just before, its boundary.
pub const FLUSH_DELTA_IN_SECONDS: f64 = 1.0;

/// Wire format of the `Timestamp` field.
pub const AWS_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub const PLUGIN_NAME: &str = "collectd-cloudwatch";
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const HOST_DIMENSION: &str = "Host";
pub const PLUGIN_INSTANCE_DIMENSION: &str = "PluginInstance";
pub const AUTO_SCALING_GROUP_DIMENSION: &str = "AutoScalingGroup";
pub const FIXED_DIMENSION: &str = "FixedDimension";
pub const INSTANCE_ID_DIMENSION: &str = "InstanceId";
pub const HOSTNAME_DIMENSION: &str = "Hostname";

/// Placeholder for dimension values that are not available.
pub const NONE_DIMENSION_VALUE: &str = "NONE";

/// Once a set of already reported metric keys holds this many keys it starts over.
pub const MAX_REPORTED_KEYS: usize = 10_000;
