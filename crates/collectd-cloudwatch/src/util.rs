// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Utility functions shared by the aggregation pipeline.

use crate::constants::AWS_TIMESTAMP_FORMAT;
use chrono::DateTime;
use std::time::{SystemTime, UNIX_EPOCH};

/// Formats a unix timestamp, truncated to the second, in the `YYYYMMDDThhmmssZ` wire format.
///
/// Returns `None` when the timestamp cannot be represented.
///
/// # Examples
///
/// ```
/// use collectd_cloudwatch::util::format_aws_timestamp;
///
/// assert_eq!(format_aws_timestamp(160), Some("19700101T000240Z".to_string()));
/// ```
#[must_use]
pub fn format_aws_timestamp(unix_seconds: i64) -> Option<String> {
    DateTime::from_timestamp(unix_seconds, 0)
        .map(|time| time.format(AWS_TIMESTAMP_FORMAT).to_string())
}

/// Parses a raw collectd value, accepting only finite numbers.
///
/// # Examples
///
/// ```
/// use collectd_cloudwatch::util::parse_numeric;
///
/// assert_eq!(parse_numeric("+1.2"), Some(1.2));
/// assert_eq!(parse_numeric(".211"), Some(0.211));
/// assert_eq!(parse_numeric("2.("), None);
/// assert_eq!(parse_numeric("NaN"), None);
/// ```
#[must_use]
pub fn parse_numeric(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Current wall clock time as fractional unix seconds.
#[must_use]
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}
