// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Filtering of metric keys before aggregation.

use crate::config::PluginConfig;
use crate::constants::MAX_REPORTED_KEYS;
use crate::errors::Config;
use hashbrown::HashSet;
use regex::Regex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

pub trait MetricFilter: Send + Sync {
    fn is_whitelisted(&self, metric_key: &str) -> bool;
}

/// Lets every metric through.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl MetricFilter for AllowAll {
    fn is_whitelisted(&self, _metric_key: &str) -> bool {
        true
    }
}

/// Regex whitelist over metric keys. A key passes when any rule matches it entirely.
#[derive(Debug)]
pub struct Whitelist {
    rules: Vec<Regex>,
    blocked: Mutex<HashSet<String, fnv::FnvBuildHasher>>,
    blocked_metrics_path: Option<PathBuf>,
}

impl Whitelist {
    /// Compiles `rules`, skipping the ones that are not valid regular expressions.
    ///
    /// Catch-all rules (`.*` or `.+` on their own) are only accepted with `pass_through`.
    pub fn new<S: AsRef<str>>(rules: impl IntoIterator<Item = S>, pass_through: bool) -> Self {
        let rules = rules
            .into_iter()
            .filter_map(|rule| compile_rule(rule.as_ref().trim(), pass_through))
            .collect();
        Self {
            rules,
            blocked: Mutex::new(HashSet::default()),
            blocked_metrics_path: None,
        }
    }

    /// Reads one rule per line; blank lines and `#` comments are skipped.
    pub fn from_file(path: impl AsRef<Path>, pass_through: bool) -> Result<Self, Config> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Config::Io {
            path: path.display().to_string(),
            source,
        })?;
        let rules = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));
        Ok(Self::new(rules, pass_through))
    }

    /// Appends every blocked key, once, to the file at `path`.
    ///
    /// Blocked keys are remembered until [`MAX_REPORTED_KEYS`] of them are, then a key may
    /// be reported again.
    #[must_use]
    pub fn with_blocked_metrics_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.blocked_metrics_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn report_blocked(&self, metric_key: &str) {
        {
            #[allow(clippy::expect_used)]
            let mut blocked = self.blocked.lock().expect("lock poisoned");
            if blocked.len() >= MAX_REPORTED_KEYS && !blocked.contains(metric_key) {
                blocked.clear();
            }
            if !blocked.insert(metric_key.to_string()) {
                return;
            }
        }
        debug!("Metric {} is not whitelisted and will be dropped", metric_key);
        if let Some(path) = &self.blocked_metrics_path {
            let appended = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| writeln!(file, "{metric_key}"));
            if let Err(e) = appended {
                warn!(
                    "Could not record blocked metric in {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }
}

impl MetricFilter for Whitelist {
    fn is_whitelisted(&self, metric_key: &str) -> bool {
        if self.rules.iter().any(|rule| rule.is_match(metric_key)) {
            return true;
        }
        self.report_blocked(metric_key);
        false
    }
}

/// The filter described by `config`: its whitelist file when one is set, otherwise
/// [`AllowAll`].
pub fn from_config(config: &PluginConfig) -> Result<Arc<dyn MetricFilter>, Config> {
    let Some(path) = &config.whitelist_path else {
        return Ok(Arc::new(AllowAll));
    };
    let mut whitelist = Whitelist::from_file(path, config.whitelist_pass_through)?;
    if let Some(blocked) = &config.blocked_metrics_path {
        whitelist = whitelist.with_blocked_metrics_path(blocked);
    }
    Ok(Arc::new(whitelist))
}

fn compile_rule(rule: &str, pass_through: bool) -> Option<Regex> {
    if rule.is_empty() {
        return None;
    }
    if !pass_through && is_catch_all(rule) {
        warn!(
            "The whitelist rule '{}' matches every metric and is ignored. Enable whitelist_pass_through to allow it",
            rule
        );
        return None;
    }
    match Regex::new(&format!("^(?:{rule})$")) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!("The whitelist rule '{}' is invalid and is ignored: {}", rule, e);
            None
        }
    }
}

fn is_catch_all(rule: &str) -> bool {
    rule.split_whitespace()
        .any(|token| token == ".*" || token == ".+")
}
