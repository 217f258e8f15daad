// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of metric batches to the CloudWatch `PutMetricData` API.

use crate::config::{validate_endpoint, PluginConfig};
use crate::constants::{PLUGIN_NAME, PLUGIN_VERSION};
use crate::errors::{Config, Submit};
use crate::metric::MetricRecord;
use reqwest::blocking::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(1);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);
const TOTAL_RETRIES: usize = 1;

/// Builds the signed `PutMetricData` query string for a batch of records.
pub trait RequestSigner: Send + Sync {
    fn create_signed_request(
        &self,
        namespace: &str,
        records: &[MetricRecord],
    ) -> Result<String, Submit>;
}

/// Submits one batch of records; any error means the batch was not delivered.
pub trait MetricsSubmitter: Send + Sync {
    fn endpoint(&self) -> &str;

    fn put_metric_data(&self, namespace: &str, records: &[MetricRecord]) -> Result<(), Submit>;
}

/// Blocking HTTP client that sends signed `PutMetricData` requests.
pub struct PutClient {
    endpoint: String,
    signer: Arc<dyn RequestSigner>,
    client: Client,
    debug: bool,
}

impl PutClient {
    pub fn new(config: &PluginConfig, signer: Arc<dyn RequestSigner>) -> Result<Self, Config> {
        let mut client = Self::with_endpoint(
            config.endpoint(),
            config.proxy_url().as_deref(),
            signer,
        )?;
        client.debug = config.debug;
        Ok(client)
    }

    pub fn with_endpoint(
        endpoint: impl Into<String>,
        proxy_url: Option<&str>,
        signer: Arc<dyn RequestSigner>,
    ) -> Result<Self, Config> {
        let endpoint = endpoint.into();
        validate_endpoint(&endpoint)?;

        let mut builder = Client::builder()
            .connect_timeout(CONNECTION_TIMEOUT)
            .timeout(RESPONSE_TIMEOUT)
            .user_agent(user_agent());
        if let Some(proxy) = proxy_url {
            let proxy = reqwest::Proxy::https(proxy)
                .map_err(|e| Config::Invalid(format!("invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| Config::Invalid(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint,
            signer,
            client,
            debug: false,
        })
    }

    fn run_request(&self, request: &str) -> Result<(), Submit> {
        let url = format!("{}?{}", self.endpoint, request);
        let mut attempt = 0;
        loop {
            match self.client.get(&url).send() {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    return Err(Submit::Status {
                        endpoint: self.endpoint.clone(),
                        request: request.to_string(),
                        status: response.status(),
                    })
                }
                Err(e) if attempt < TOTAL_RETRIES => {
                    attempt += 1;
                    debug!("Retrying request to {} after error: {}", self.endpoint, e);
                }
                Err(source) => {
                    return Err(Submit::Request {
                        endpoint: self.endpoint.clone(),
                        request: request.to_string(),
                        source,
                    })
                }
            }
        }
    }
}

impl MetricsSubmitter for PutClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// All records must belong to `namespace`.
    fn put_metric_data(&self, namespace: &str, records: &[MetricRecord]) -> Result<(), Submit> {
        if let Some(record) = records.iter().find(|record| record.namespace != namespace) {
            return Err(Submit::NamespaceMismatch {
                expected: namespace.to_string(),
                found: record.namespace.clone(),
            });
        }
        let request = self.signer.create_signed_request(namespace, records)?;
        if self.debug {
            info!("[debug] Putting {} metrics: {}", records.len(), request);
        }
        self.run_request(&request)
    }
}

fn user_agent() -> String {
    format!("{PLUGIN_NAME}/{PLUGIN_VERSION}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Dimensions;
    use mockito::{Matcher, Server};
    use reqwest::StatusCode;

    struct QuerySigner;

    impl RequestSigner for QuerySigner {
        fn create_signed_request(
            &self,
            namespace: &str,
            records: &[MetricRecord],
        ) -> Result<String, Submit> {
            Ok(format!(
                "Action=PutMetricData&Namespace={namespace}&Count={}",
                records.len()
            ))
        }
    }

    struct FailingSigner;

    impl RequestSigner for FailingSigner {
        fn create_signed_request(&self, _: &str, _: &[MetricRecord]) -> Result<String, Submit> {
            Err(Submit::Signing("missing credentials".to_string()))
        }
    }

    fn records(namespace: &str, count: usize) -> Vec<MetricRecord> {
        (0..count)
            .map(|i| {
                let mut record =
                    MetricRecord::new(namespace, format!("metric.{i}"), Dimensions::new());
                record.add_value(1.0);
                record
            })
            .collect()
    }

    #[test]
    fn test_put_metric_data_sends_signed_request() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("Action".into(), "PutMetricData".into()),
                Matcher::UrlEncoded("Namespace".into(), "collectd".into()),
                Matcher::UrlEncoded("Count".into(), "2".into()),
            ]))
            .match_header("User-Agent", user_agent().as_str())
            .with_status(200)
            .create();

        let client = PutClient::with_endpoint(format!("{}/", server.url()), None, Arc::new(QuerySigner))
            .expect("failed to create client");
        client
            .put_metric_data("collectd", &records("collectd", 2))
            .expect("put failed");
        mock.assert();
    }

    #[test]
    fn test_error_status_is_reported() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/")
            .match_query(Matcher::Any)
            .with_status(403)
            .create();

        let client = PutClient::with_endpoint(format!("{}/", server.url()), None, Arc::new(QuerySigner))
            .expect("failed to create client");
        let error = client
            .put_metric_data("collectd", &records("collectd", 1))
            .expect_err("403 should fail");
        assert!(matches!(
            &error,
            Submit::Status { status, .. } if *status == StatusCode::FORBIDDEN
        ));
        assert_eq!(
            error.request(),
            Some("Action=PutMetricData&Namespace=collectd&Count=1")
        );
        mock.assert();
    }

    #[test]
    fn test_namespace_mismatch() {
        let client = PutClient::with_endpoint("http://localhost/", None, Arc::new(QuerySigner))
            .expect("failed to create client");
        let mut batch = records("collectd", 2);
        batch[1].namespace = "other".to_string();
        let error = client
            .put_metric_data("collectd", &batch)
            .expect_err("mixed namespaces should fail");
        assert!(matches!(
            error,
            Submit::NamespaceMismatch { found, .. } if found == "other"
        ));
    }

    #[test]
    fn test_signing_error_is_propagated() {
        let client = PutClient::with_endpoint("http://localhost/", None, Arc::new(FailingSigner))
            .expect("failed to create client");
        let error = client
            .put_metric_data("collectd", &records("collectd", 1))
            .expect_err("signing should fail");
        assert!(matches!(error, Submit::Signing(_)));
    }

    #[test]
    fn test_transport_error_after_retry() {
        let client = PutClient::with_endpoint("http://127.0.0.1:1/", None, Arc::new(QuerySigner))
            .expect("failed to create client");
        let error = client
            .put_metric_data("collectd", &records("collectd", 1))
            .expect_err("closed port should fail");
        assert!(matches!(error, Submit::Request { .. }));
        assert!(error.request().is_some());
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = PutClient::with_endpoint("monitoring.amazonaws.com", None, Arc::new(QuerySigner));
        assert!(matches!(result, Err(Config::InvalidEndpoint(_))));
    }

    #[test]
    fn test_new_from_config() {
        let config = PluginConfig {
            region: "cn-north-1".to_string(),
            proxy_server_name: Some("http://proxy.local".to_string()),
            proxy_server_port: Some("3128".to_string()),
            ..Default::default()
        };
        let client = PutClient::new(&config, Arc::new(QuerySigner)).expect("failed to create client");
        assert_eq!(
            client.endpoint(),
            "https://monitoring.cn-north-1.amazonaws.com.cn/"
        );
    }
}
