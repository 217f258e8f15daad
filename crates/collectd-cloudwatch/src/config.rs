// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{
    DEFAULT_FLUSH_INTERVAL_IN_SECONDS, DEFAULT_NAMESPACE, MAX_METRICS_TO_AGGREGATE,
    MAX_METRICS_TO_AGGREGATE_HIGH_RESOLUTION,
};
use crate::errors::Config;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const COMMENT_CHARACTER: char = '#';
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Static configuration snapshot of the plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginConfig {
    /// AWS region the metrics are published to, `localhost` for a local test endpoint
    pub region: String,
    /// Value of the `Host` dimension; the sample host is used when empty
    pub host: String,
    pub credentials_path: Option<String>,
    /// Verbose logging of every flush
    pub debug: bool,
    /// Accept catch-all whitelist rules such as `.*`
    pub whitelist_pass_through: bool,
    pub push_asg: bool,
    pub asg_name: Option<String>,
    pub push_constant: bool,
    pub constant_dimension_value: String,
    pub proxy_server_name: Option<String>,
    pub proxy_server_port: Option<String>,
    /// HTTPS proxy URL taken from the environment
    pub https_proxy: Option<String>,
    pub enable_high_resolution_metrics: bool,
    pub flush_interval_in_seconds: u64,
    pub namespace: String,
    /// Overrides the endpoint derived from the region
    pub endpoint: Option<String>,
    pub whitelist_path: Option<PathBuf>,
    pub blocked_metrics_path: Option<PathBuf>,
    /// File listing the dimensions pushed with every metric, one name per line
    pub dimensions_path: Option<PathBuf>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            host: String::new(),
            credentials_path: None,
            debug: false,
            whitelist_pass_through: false,
            push_asg: false,
            asg_name: None,
            push_constant: false,
            constant_dimension_value: String::new(),
            proxy_server_name: None,
            proxy_server_port: None,
            https_proxy: None,
            enable_high_resolution_metrics: false,
            flush_interval_in_seconds: DEFAULT_FLUSH_INTERVAL_IN_SECONDS,
            namespace: DEFAULT_NAMESPACE.to_string(),
            endpoint: None,
            whitelist_path: None,
            blocked_metrics_path: None,
            dimensions_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl PluginConfig {
    /// Reads the plugin configuration file, fills the gaps from the environment and validates
    /// the result.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Config> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Config::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::parse(&contents)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parses `key = value` lines. When a key repeats, its first value wins.
    pub fn parse(contents: &str) -> Result<Self, Config> {
        let mut entries: HashMap<String, String> = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(COMMENT_CHARACTER) {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Config::InvalidEntry(line.to_string()))?;
            entries
                .entry(key.trim().to_string())
                .or_insert_with(|| strip_quotes(value.trim()).trim().to_string());
        }

        let string = |key: &str| -> Option<String> {
            entries.get(key).filter(|value| !value.is_empty()).cloned()
        };
        let boolean = |key: &str| -> bool {
            entries
                .get(key)
                .and_then(|value| parse_bool(value))
                .unwrap_or(false)
        };

        let defaults = Self::default();
        let config = Self {
            region: string("region").unwrap_or_default(),
            host: string("host").unwrap_or_default(),
            credentials_path: string("credentials_path"),
            debug: boolean("debug"),
            whitelist_pass_through: boolean("whitelist_pass_through"),
            push_asg: boolean("push_asg"),
            asg_name: string("asg_name"),
            push_constant: boolean("push_constant"),
            constant_dimension_value: string("constant_dimension_value").unwrap_or_default(),
            proxy_server_name: string("proxy_server_name"),
            proxy_server_port: string("proxy_server_port"),
            https_proxy: None,
            enable_high_resolution_metrics: boolean("enable_high_resolution_metrics"),
            flush_interval_in_seconds: string("flush_interval_in_seconds")
                .map_or(DEFAULT_FLUSH_INTERVAL_IN_SECONDS, |raw| {
                    parse_flush_interval(&raw)
                }),
            namespace: string("namespace").unwrap_or(defaults.namespace),
            endpoint: string("endpoint"),
            whitelist_path: string("whitelist_path").map(PathBuf::from),
            blocked_metrics_path: string("blocked_metrics_path").map(PathBuf::from),
            dimensions_path: string("dimensions_path").map(PathBuf::from),
            log_level: string("log_level")
                .map(|level| level.to_lowercase())
                .unwrap_or(defaults.log_level),
        };
        debug!("Parsed {} plugin configuration entries", entries.len());
        Ok(config)
    }

    /// Fills settings the configuration file left empty from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| env::var(name).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if self.region.is_empty() {
            if let Some(region) = lookup("AWS_REGION").or_else(|| lookup("AWS_DEFAULT_REGION")) {
                self.region = region;
            }
        }
        if self.host.is_empty() {
            if let Some(host) = lookup("COLLECTD_CLOUDWATCH_HOST") {
                self.host = host;
            }
        }
        if let Some(level) = lookup("COLLECTD_CLOUDWATCH_LOG_LEVEL") {
            if self.log_level == Self::default().log_level {
                self.log_level = level.to_lowercase();
            }
        }
        if self.https_proxy.is_none() {
            self.https_proxy = lookup("HTTPS_PROXY");
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Config> {
        if self.region.trim().is_empty() {
            return Err(Config::Invalid("region is missing".to_string()));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(Config::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        if self.push_constant && self.constant_dimension_value.trim().is_empty() {
            return Err(Config::Invalid(
                "push_constant requires constant_dimension_value".to_string(),
            ));
        }

        if let Some(port) = &self.proxy_server_port {
            if port.parse::<u16>().is_err() {
                return Err(Config::Invalid(format!("invalid proxy_server_port '{port}'")));
            }
        }

        validate_endpoint(&self.endpoint())
    }

    /// The `PutMetricData` endpoint, explicit or derived from the region.
    #[must_use]
    pub fn endpoint(&self) -> String {
        if let Some(endpoint) = &self.endpoint {
            return endpoint.clone();
        }
        if self.region == "localhost" {
            "http://localhost/".to_string()
        } else if self.region.starts_with("cn-") {
            format!("https://monitoring.{}.amazonaws.com.cn/", self.region)
        } else {
            format!("https://monitoring.{}.amazonaws.com/", self.region)
        }
    }

    /// Proxy for the submissions; the configured proxy server takes precedence over
    /// `HTTPS_PROXY`.
    #[must_use]
    pub fn proxy_url(&self) -> Option<String> {
        match (&self.proxy_server_name, &self.proxy_server_port) {
            (Some(name), Some(port)) => Some(format!("{name}:{port}")),
            (Some(name), None) => Some(name.clone()),
            (None, _) => self.https_proxy.clone(),
        }
    }

    /// Upper bound on the number of distinct metric keys held between flushes.
    #[must_use]
    pub fn max_metrics_to_aggregate(&self) -> usize {
        if self.enable_high_resolution_metrics {
            MAX_METRICS_TO_AGGREGATE_HIGH_RESOLUTION
        } else {
            MAX_METRICS_TO_AGGREGATE
        }
    }

    /// Value of the `AutoScalingGroup` dimension when it is pushed.
    #[must_use]
    pub fn asg_dimension_value(&self) -> Option<&str> {
        self.push_asg
            .then(|| self.asg_name.as_deref().unwrap_or(crate::constants::NONE_DIMENSION_VALUE))
    }

    /// Value of the `FixedDimension` dimension when it is pushed.
    #[must_use]
    pub fn constant_dimension(&self) -> Option<&str> {
        self.push_constant
            .then_some(self.constant_dimension_value.as_str())
    }
}

/// Accepts `http://` and `https://` URLs and anything pointing at `localhost`.
pub fn validate_endpoint(endpoint: &str) -> Result<(), Config> {
    if endpoint.starts_with("http://")
        || endpoint.starts_with("https://")
        || endpoint.contains("localhost")
    {
        Ok(())
    } else {
        Err(Config::InvalidEndpoint(endpoint.to_string()))
    }
}

fn strip_quotes(value: &str) -> &str {
    let value = value
        .strip_prefix(['\'', '"'])
        .unwrap_or(value);
    value.strip_suffix(['\'', '"']).unwrap_or(value)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_flush_interval(raw: &str) -> u64 {
    match raw.parse::<u64>() {
        Ok(interval) if interval > 0 => interval,
        _ => {
            warn!(
                "Invalid flush_interval_in_seconds '{}', using the default of {} seconds",
                raw, DEFAULT_FLUSH_INTERVAL_IN_SECONDS
            );
            DEFAULT_FLUSH_INTERVAL_IN_SECONDS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    const PLUGIN_CONF: &str = r#"
# plugin configuration
region = "us-west-2"
host = 'web-01'
credentials_path = /etc/collectd/.aws/credentials
debug = TRUE
whitelist_pass_through = nope
push_asg = true
push_constant = true
constant_dimension_value = "ALL"
enable_high_resolution_metrics = False
flush_interval_in_seconds = 30
dimensions_path = "/etc/collectd/dimensions.conf"
"#;

    fn valid() -> PluginConfig {
        PluginConfig {
            region: "us-east-1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_plugin_conf() {
        let config = PluginConfig::parse(PLUGIN_CONF).expect("config parse failed");
        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.host, "web-01");
        assert_eq!(
            config.credentials_path.as_deref(),
            Some("/etc/collectd/.aws/credentials")
        );
        assert!(config.debug);
        assert!(!config.whitelist_pass_through);
        assert!(config.push_asg);
        assert_eq!(config.asg_dimension_value(), Some("NONE"));
        assert_eq!(config.constant_dimension(), Some("ALL"));
        assert!(!config.enable_high_resolution_metrics);
        assert_eq!(config.flush_interval_in_seconds, 30);
        assert_eq!(config.namespace, "collectd");
        assert_eq!(
            config.dimensions_path,
            Some(PathBuf::from("/etc/collectd/dimensions.conf"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_first_entry_wins() {
        let config = PluginConfig::parse("region = eu-west-1\nregion = us-east-1")
            .expect("config parse failed");
        assert_eq!(config.region, "eu-west-1");
    }

    #[test]
    fn test_entry_without_separator_is_rejected() {
        let result = PluginConfig::parse("region = us-east-1\nhost web-01");
        assert!(matches!(result, Err(Config::InvalidEntry(entry)) if entry == "host web-01"));
    }

    #[test]
    #[traced_test]
    fn test_invalid_flush_interval_falls_back_to_default() {
        for raw in ["0", "-5", "ten"] {
            let config = PluginConfig::parse(&format!("flush_interval_in_seconds = {raw}"))
                .expect("config parse failed");
            assert_eq!(config.flush_interval_in_seconds, 60);
        }
        assert!(logs_contain("Invalid flush_interval_in_seconds"));

        let config = PluginConfig::parse("").expect("config parse failed");
        assert_eq!(config.flush_interval_in_seconds, 60);
    }

    #[test]
    fn test_endpoint_from_region() {
        let mut config = valid();
        assert_eq!(config.endpoint(), "https://monitoring.us-east-1.amazonaws.com/");
        config.region = "cn-north-1".to_string();
        assert_eq!(config.endpoint(), "https://monitoring.cn-north-1.amazonaws.com.cn/");
        config.region = "localhost".to_string();
        assert_eq!(config.endpoint(), "http://localhost/");
        config.endpoint = Some("http://127.0.0.1:8080/".to_string());
        assert_eq!(config.endpoint(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_env_fills_only_empty_fields() {
        let env: HashMap<&str, &str> = [
            ("AWS_DEFAULT_REGION", "ap-south-1"),
            ("COLLECTD_CLOUDWATCH_HOST", "env-host"),
            ("COLLECTD_CLOUDWATCH_LOG_LEVEL", "DEBUG"),
            ("HTTPS_PROXY", "http://proxy:3128"),
        ]
        .into_iter()
        .collect();
        let lookup = |name: &str| env.get(name).map(|value| value.to_string());

        let mut config = PluginConfig::default();
        config.apply_env_from(lookup);
        assert_eq!(config.region, "ap-south-1");
        assert_eq!(config.host, "env-host");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.proxy_url().as_deref(), Some("http://proxy:3128"));

        let mut config = PluginConfig::parse("region = us-east-1\nhost = file-host")
            .expect("config parse failed");
        config.apply_env_from(lookup);
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.host, "file-host");
    }

    #[test]
    fn test_configured_proxy_takes_precedence() {
        let config = PluginConfig {
            proxy_server_name: Some("http://proxy.local".to_string()),
            proxy_server_port: Some("8080".to_string()),
            https_proxy: Some("http://other:3128".to_string()),
            ..valid()
        };
        assert_eq!(config.proxy_url().as_deref(), Some("http://proxy.local:8080"));
    }

    #[test]
    fn test_default_config_is_invalid_without_region() {
        assert!(PluginConfig::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = PluginConfig {
            log_level: "verbose".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_push_constant_without_value() {
        let config = PluginConfig {
            push_constant: true,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_proxy_port() {
        let config = PluginConfig {
            proxy_server_name: Some("proxy".to_string()),
            proxy_server_port: Some("99999".to_string()),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("https://monitoring.us-east-1.amazonaws.com/").is_ok());
        assert!(validate_endpoint("localhost:8080").is_ok());
        assert!(matches!(
            validate_endpoint("monitoring.amazonaws.com"),
            Err(Config::InvalidEndpoint(_))
        ));
        let config = PluginConfig {
            endpoint: Some("ftp://example.com".to_string()),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_metrics_to_aggregate() {
        let mut config = valid();
        assert_eq!(config.max_metrics_to_aggregate(), 2000);
        config.enable_high_resolution_metrics = true;
        assert_eq!(config.max_metrics_to_aggregate(), 20);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plugin.conf");
        std::fs::write(&path, PLUGIN_CONF).expect("write plugin.conf");
        let config = PluginConfig::from_file(&path).expect("config load failed");
        assert_eq!(config.region, "us-west-2");

        let missing = PluginConfig::from_file(dir.path().join("missing.conf"));
        assert!(matches!(missing, Err(Config::Io { .. })));
    }
}
