// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::PluginConfig;
use crate::constants::{
    AUTO_SCALING_GROUP_DIMENSION, FIXED_DIMENSION, NONE_DIMENSION_VALUE,
    PLUGIN_INSTANCE_DIMENSION,
};
use crate::dimensions::{self, BaseDimension, DEFAULT_BASE_DIMENSIONS};
use crate::metric::{Dimensions, MetricRecord};
use crate::sample::Sample;
use crate::util::format_aws_timestamp;

/// Turns samples into the metric records stored under their key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRecordBuilder {
    namespace: String,
    host: Option<String>,
    base_dimensions: Vec<BaseDimension>,
    asg: Option<String>,
    constant: Option<String>,
}

impl MetricRecordBuilder {
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            host: None,
            base_dimensions: DEFAULT_BASE_DIMENSIONS.to_vec(),
            asg: None,
            constant: None,
        }
    }

    #[must_use]
    pub fn from_config(config: &PluginConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            host: Some(config.host.clone()).filter(|host| !host.is_empty()),
            base_dimensions: dimensions::from_config(config),
            asg: config.asg_dimension_value().map(str::to_string),
            constant: config.constant_dimension().map(str::to_string),
        }
    }

    /// Overrides the `Host` dimension, which otherwise comes from the sample.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Replaces the dimensions of the base record, `Host` and `PluginInstance` by default.
    #[must_use]
    pub fn with_base_dimensions(
        mut self,
        base_dimensions: impl IntoIterator<Item = BaseDimension>,
    ) -> Self {
        self.base_dimensions = base_dimensions.into_iter().collect();
        self
    }

    /// Adds an `AutoScalingGroup` variant of every record.
    #[must_use]
    pub fn with_auto_scaling_group(mut self, asg: impl Into<String>) -> Self {
        self.asg = Some(asg.into());
        self
    }

    /// Adds a `FixedDimension` variant of every record.
    #[must_use]
    pub fn with_fixed_dimension(mut self, value: impl Into<String>) -> Self {
        self.constant = Some(value.into());
        self
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Builds the records for `sample` without any values folded in yet.
    ///
    /// `second` is the truncated sample time in high resolution mode and stamps every record;
    /// without it records carry no timestamp.
    #[must_use]
    pub fn build(&self, sample: &Sample, second: Option<i64>) -> Vec<MetricRecord> {
        let metric_name = metric_name(sample);
        let plugin_instance = if sample.plugin_instance.is_empty() {
            NONE_DIMENSION_VALUE
        } else {
            sample.plugin_instance.as_str()
        };
        let host = self.host.as_deref().unwrap_or(&sample.host);

        let base: Dimensions = self
            .base_dimensions
            .iter()
            .map(|dimension| {
                let value = match dimension {
                    BaseDimension::Host | BaseDimension::InstanceId => host,
                    BaseDimension::PluginInstance => plugin_instance,
                    BaseDimension::Hostname => sample.host.as_str(),
                };
                (dimension.name(), value)
            })
            .collect();
        let mut dimension_sets = vec![base];
        if let Some(asg) = &self.asg {
            dimension_sets.push(Dimensions::from_iter([
                (AUTO_SCALING_GROUP_DIMENSION, asg.as_str()),
                (PLUGIN_INSTANCE_DIMENSION, plugin_instance),
            ]));
        }
        if let Some(constant) = &self.constant {
            dimension_sets.push(Dimensions::from_iter([
                (FIXED_DIMENSION, constant.as_str()),
                (PLUGIN_INSTANCE_DIMENSION, plugin_instance),
            ]));
        }

        let timestamp = second.and_then(format_aws_timestamp);
        dimension_sets
            .into_iter()
            .map(|dimensions| {
                let mut record = MetricRecord::new(&self.namespace, &metric_name, dimensions);
                record.timestamp = timestamp.clone();
                record
            })
            .collect()
    }
}

/// `plugin.type`, followed by `.type_instance` when there is one.
#[must_use]
pub fn metric_name(sample: &Sample) -> String {
    if sample.type_instance.is_empty() {
        format!("{}.{}", sample.plugin, sample.sample_type)
    } else {
        format!(
            "{}.{}.{}",
            sample.plugin, sample.sample_type, sample.type_instance
        )
    }
}
