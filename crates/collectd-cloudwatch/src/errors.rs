// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the aggregation pipeline and its collaborators.

use reqwest::StatusCode;

/// Error returned by [`crate::aggregator::Aggregator::upsert`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Insert {
    #[error("aggregation store is at capacity")]
    Overflow,
}

/// Failure to deliver one batch of metric records.
#[derive(Debug, thiserror::Error)]
pub enum Submit {
    #[error("metric list contains namespace '{found}' different than '{expected}'")]
    NamespaceMismatch { expected: String, found: String },

    #[error("failed to sign request: {0}")]
    Signing(String),

    #[error("could not put metric data using endpoint '{endpoint}': {source}")]
    Request {
        endpoint: String,
        request: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("endpoint '{endpoint}' answered with status {status}")]
    Status {
        endpoint: String,
        request: String,
        status: StatusCode,
    },
}

impl Submit {
    /// The signed request that failed, when one was built.
    #[must_use]
    pub fn request(&self) -> Option<&str> {
        match self {
            Self::Request { request, .. } | Self::Status { request, .. } => Some(request),
            _ => None,
        }
    }
}

/// Failure to load or validate the plugin configuration.
#[derive(Debug, thiserror::Error)]
pub enum Config {
    #[error("cannot read plugin configuration file at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid syntax for entry '{0}'")]
    InvalidEntry(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("provided endpoint '{0}' is not a valid URL")]
    InvalidEndpoint(String),
}

/// Failure to decode collectd input.
#[derive(Debug, thiserror::Error)]
pub enum Parse {
    #[error("invalid collectd JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid types.db entry: {0}")]
    TypesDb(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_error_display() {
        let error = Submit::NamespaceMismatch {
            expected: "collectd".to_string(),
            found: "other".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "metric list contains namespace 'other' different than 'collectd'"
        );
        assert!(error.request().is_none());
    }

    #[test]
    fn test_status_error_keeps_request() {
        let error = Submit::Status {
            endpoint: "http://localhost/".to_string(),
            request: "Action=PutMetricData".to_string(),
            status: StatusCode::FORBIDDEN,
        };
        assert_eq!(error.request(), Some("Action=PutMetricData"));
        assert!(error.to_string().contains("http://localhost/"));
    }

    #[test]
    fn test_config_error_display() {
        let error = Config::InvalidEntry("region".into());
        assert_eq!(error.to_string(), "invalid syntax for entry 'region'");
    }
}
