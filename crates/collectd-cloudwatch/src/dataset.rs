// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Resolution of collectd data set names, used to split multi-value samples.
//!
//! collectd describes every `type` in `types.db` as a list of data sources, e.g.
//! `if_octets  rx:DERIVE:0:U, tx:DERIVE:0:U`. A sample of type `if_octets` carries
//! one value per data source, in that order.

use crate::errors::Parse;
use crate::sample::DataSourceType;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Looks up the per-value names of a collectd type.
pub trait DatasetResolver: Send + Sync {
    /// Data source names of `sample_type`, or an empty list when the type is unknown.
    fn dataset_names(&self, sample_type: &str) -> Vec<String>;
}

/// Resolver that knows no types, so multi-value samples are never split.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDatasets;

impl DatasetResolver for NoDatasets {
    fn dataset_names(&self, _sample_type: &str) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub name: String,
    pub ds_type: DataSourceType,
}

/// In-memory copy of a collectd `types.db` file.
#[derive(Debug, Default, Clone)]
pub struct TypesDb {
    types: HashMap<String, Vec<DataSource>>,
}

impl TypesDb {
    /// Parses `types.db` content. Blank lines and `#` comments are skipped.
    pub fn parse(contents: &str) -> Result<Self, Parse> {
        let mut types = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (type_name, sources) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| Parse::TypesDb(line.to_string()))?;
            let sources = sources
                .split(',')
                .map(|source| parse_data_source(source.trim(), line))
                .collect::<Result<Vec<_>, _>>()?;
            types.insert(type_name.to_string(), sources);
        }
        debug!("Loaded {} collectd types", types.len());
        Ok(Self { types })
    }

    /// Reads and parses a `types.db` file. A missing or unreadable file yields an
    /// empty database so multi-value samples are simply not split.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Parse> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(e) => {
                warn!("Could not read types.db at {}: {}", path.display(), e);
                Ok(Self::default())
            }
        }
    }

    #[must_use]
    pub fn data_sources(&self, sample_type: &str) -> Option<&[DataSource]> {
        self.types.get(sample_type).map(Vec::as_slice)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl DatasetResolver for TypesDb {
    fn dataset_names(&self, sample_type: &str) -> Vec<String> {
        self.data_sources(sample_type)
            .map(|sources| sources.iter().map(|source| source.name.clone()).collect())
            .unwrap_or_default()
    }
}

fn parse_data_source(source: &str, line: &str) -> Result<DataSource, Parse> {
    let mut parts = source.split(':');
    let name = parts
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Parse::TypesDb(line.to_string()))?;
    let ds_type = parts
        .next()
        .and_then(|kind| kind.parse::<DataSourceType>().ok())
        .ok_or_else(|| Parse::TypesDb(line.to_string()))?;
    Ok(DataSource {
        name: name.to_string(),
        ds_type,
    })
}
