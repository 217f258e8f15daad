// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Choice of the dimensions every metric record is published with.

use crate::config::PluginConfig;
use crate::constants::{
    HOSTNAME_DIMENSION, HOST_DIMENSION, INSTANCE_ID_DIMENSION, PLUGIN_INSTANCE_DIMENSION,
};
use crate::errors::Config;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// A dimension of the base record of every metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaseDimension {
    /// Configured host, or the sample host when none is configured. Only used by default.
    Host,
    /// Configured host, or the sample host when none is configured.
    InstanceId,
    PluginInstance,
    /// Host of the sample.
    Hostname,
}

/// Dimensions used when no dimensions file is configured.
pub const DEFAULT_BASE_DIMENSIONS: [BaseDimension; 2] =
    [BaseDimension::Host, BaseDimension::PluginInstance];

impl BaseDimension {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Host => HOST_DIMENSION,
            Self::InstanceId => INSTANCE_ID_DIMENSION,
            Self::PluginInstance => PLUGIN_INSTANCE_DIMENSION,
            Self::Hostname => HOSTNAME_DIMENSION,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown dimension '{0}'")]
pub struct UnknownDimension(String);

impl FromStr for BaseDimension {
    type Err = UnknownDimension;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            INSTANCE_ID_DIMENSION => Ok(Self::InstanceId),
            PLUGIN_INSTANCE_DIMENSION => Ok(Self::PluginInstance),
            HOSTNAME_DIMENSION => Ok(Self::Hostname),
            _ => Err(UnknownDimension(s.to_string())),
        }
    }
}

/// Parses one dimension name per line. Blank lines and `#` comments are skipped, unknown
/// and repeated names are ignored.
#[must_use]
pub fn parse(contents: &str) -> Vec<BaseDimension> {
    let mut dimensions = Vec::new();
    let lines = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'));
    for line in lines {
        match line.parse::<BaseDimension>() {
            Ok(dimension) if !dimensions.contains(&dimension) => dimensions.push(dimension),
            Ok(_) => {}
            Err(e) => warn!("Ignoring {}", e),
        }
    }
    dimensions
}

pub fn from_file(path: impl AsRef<Path>) -> Result<Vec<BaseDimension>, Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| Config::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse(&contents))
}

/// The base dimensions described by `config`: the ones listed in its dimensions file, or
/// [`DEFAULT_BASE_DIMENSIONS`] when no file is set, it cannot be read or it names no known
/// dimension.
#[must_use]
pub fn from_config(config: &PluginConfig) -> Vec<BaseDimension> {
    let Some(path) = &config.dimensions_path else {
        return DEFAULT_BASE_DIMENSIONS.to_vec();
    };
    match from_file(path) {
        Ok(dimensions) if !dimensions.is_empty() => dimensions,
        Ok(_) => {
            warn!(
                "No known dimension in {}. Defaulting to default dimensions.",
                path.display()
            );
            DEFAULT_BASE_DIMENSIONS.to_vec()
        }
        Err(e) => {
            warn!(
                "Cannot read AWS dimensions from file. Defaulting to default dimensions. {}",
                e
            );
            DEFAULT_BASE_DIMENSIONS.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_parse() {
        let dimensions = parse("# pushed dimensions\nInstanceId\n\n  PluginInstance  \nHostname\n");
        assert_eq!(
            dimensions,
            vec![
                BaseDimension::InstanceId,
                BaseDimension::PluginInstance,
                BaseDimension::Hostname
            ]
        );
        assert_eq!(
            dimensions.iter().map(|d| d.name()).collect::<Vec<_>>(),
            vec!["InstanceId", "PluginInstance", "Hostname"]
        );
    }

    #[test]
    #[traced_test]
    fn test_unknown_and_repeated_names_are_ignored() {
        let dimensions = parse("PluginInstance\nRegion\nPluginInstance\nHost\n");
        assert_eq!(dimensions, vec![BaseDimension::PluginInstance]);
        assert!(logs_contain("unknown dimension 'Region'"));
        assert!(logs_contain("unknown dimension 'Host'"));
    }

    #[test]
    fn test_from_config_without_file() {
        assert_eq!(
            from_config(&PluginConfig::default()),
            DEFAULT_BASE_DIMENSIONS.to_vec()
        );
    }

    #[test]
    fn test_from_config_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dimensions.conf");
        std::fs::write(&path, "Hostname\nInstanceId\n").expect("write dimensions");
        let config = PluginConfig {
            dimensions_path: Some(path),
            ..Default::default()
        };
        assert_eq!(
            from_config(&config),
            vec![BaseDimension::Hostname, BaseDimension::InstanceId]
        );
    }

    #[test]
    #[traced_test]
    fn test_from_config_falls_back_on_empty_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dimensions.conf");
        std::fs::write(&path, "# nothing\nRegion\n").expect("write dimensions");
        let config = PluginConfig {
            dimensions_path: Some(path),
            ..Default::default()
        };
        assert_eq!(from_config(&config), DEFAULT_BASE_DIMENSIONS.to_vec());
        assert!(logs_contain("No known dimension in"));
    }

    #[test]
    #[traced_test]
    fn test_from_config_falls_back_on_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = PluginConfig {
            dimensions_path: Some(dir.path().join("missing.conf")),
            ..Default::default()
        };
        assert_eq!(from_config(&config), DEFAULT_BASE_DIMENSIONS.to_vec());
        assert!(logs_contain("Cannot read AWS dimensions from file"));
    }
}
