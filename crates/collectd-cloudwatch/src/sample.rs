// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Raw collectd value lists as handed to the write callback.

use crate::dataset::DatasetResolver;
use crate::errors::Parse;
use crate::metric::MetricKey;
use crate::util::parse_numeric;
use derive_more::Display;
use serde::Deserialize;
use std::str::FromStr;

/// How collectd produced a value, which decides whether it is reported as-is or as a rate.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceType {
    #[default]
    #[display("gauge")]
    Gauge,
    #[display("derive")]
    Derive,
    #[display("counter")]
    Counter,
    #[display("absolute")]
    Absolute,
}

impl DataSourceType {
    /// Derive and counter values are monotonic totals and get turned into rates.
    #[must_use]
    pub fn is_cumulative(self) -> bool {
        matches!(self, Self::Derive | Self::Counter)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown data source type '{0}'")]
pub struct UnknownDataSourceType(String);

impl FromStr for DataSourceType {
    type Err = UnknownDataSourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gauge" => Ok(Self::Gauge),
            "derive" => Ok(Self::Derive),
            "counter" => Ok(Self::Counter),
            "absolute" => Ok(Self::Absolute),
            _ => Err(UnknownDataSourceType(s.to_string())),
        }
    }
}

/// One raw value of a sample. collectd may hand over values that are not numbers at all.
#[derive(Clone, Debug, Display, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    #[display("{_0}")]
    Number(f64),
    #[display("{_0}")]
    Text(String),
    #[display("None")]
    Missing,
}

impl SampleValue {
    /// The value as a finite number, or `None` when it cannot be aggregated.
    #[must_use]
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value).filter(|value| value.is_finite()),
            Self::Text(raw) => parse_numeric(raw),
            Self::Missing => None,
        }
    }
}

impl From<f64> for SampleValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for SampleValue {
    fn from(raw: &str) -> Self {
        Self::Text(raw.to_string())
    }
}

/// A collectd value list.
///
/// The field names follow collectd's `write_http` JSON output so a list of samples can be
/// decoded straight from it with [`parse_write_http`].
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Sample {
    pub host: String,
    pub plugin: String,
    pub plugin_instance: String,
    #[serde(rename = "type")]
    pub sample_type: String,
    pub type_instance: String,
    pub values: Vec<SampleValue>,
    #[serde(rename = "dstypes")]
    pub ds_types: Vec<DataSourceType>,
    #[serde(rename = "dsnames")]
    pub ds_names: Vec<String>,
    /// Unix time in seconds.
    pub time: f64,
    /// Nominal collection interval in seconds.
    pub interval: f64,
}

impl Sample {
    #[must_use]
    pub fn new(
        plugin: impl Into<String>,
        plugin_instance: impl Into<String>,
        sample_type: impl Into<String>,
        type_instance: impl Into<String>,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            plugin_instance: plugin_instance.into(),
            sample_type: sample_type.into(),
            type_instance: type_instance.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn with_values<V: Into<SampleValue>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_ds_types(mut self, ds_types: impl IntoIterator<Item = DataSourceType>) -> Self {
        self.ds_types = ds_types.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_ds_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.ds_names = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    #[must_use]
    pub fn with_interval(mut self, interval: f64) -> Self {
        self.interval = interval;
        self
    }

    /// Aggregation key, `plugin-plugin_instance-type-type_instance`.
    #[must_use]
    pub fn metric_key(&self) -> MetricKey {
        MetricKey::new(
            &self.plugin,
            &self.plugin_instance,
            &self.sample_type,
            &self.type_instance,
        )
    }

    /// The sample time truncated to the second.
    #[must_use]
    pub fn second(&self) -> i64 {
        self.time.trunc() as i64
    }

    /// Data source type of the first value; a sample without type information is a gauge.
    #[must_use]
    pub fn ds_type(&self) -> DataSourceType {
        self.ds_types.first().copied().unwrap_or_default()
    }

    /// Splits a multi-value sample into one single-value sample per data source.
    ///
    /// Names come from the sample itself when it carries one per value, otherwise from
    /// `resolver`. When neither knows one name per value, the value index is used as name.
    #[must_use]
    pub fn expand(self, resolver: &dyn DatasetResolver) -> Vec<Sample> {
        if self.values.len() <= 1 {
            return vec![self];
        }
        let mut names = if self.ds_names.len() == self.values.len() {
            self.ds_names.clone()
        } else {
            resolver.dataset_names(&self.sample_type)
        };
        if names.len() != self.values.len() {
            names = (0..self.values.len()).map(|index| index.to_string()).collect();
        }

        let default_type = self.ds_type();
        names
            .into_iter()
            .zip(self.values.iter().cloned())
            .enumerate()
            .map(|(index, (name, value))| {
                let type_instance = if self.type_instance.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", self.type_instance, name)
                };
                Sample {
                    type_instance,
                    values: vec![value],
                    ds_types: vec![self.ds_types.get(index).copied().unwrap_or(default_type)],
                    ds_names: vec![name],
                    ..self.clone()
                }
            })
            .collect()
    }
}

/// Decodes the JSON body collectd's `write_http` plugin posts with `Format "JSON"`.
pub fn parse_write_http(body: &str) -> Result<Vec<Sample>, Parse> {
    Ok(serde_json::from_str(body)?)
}
