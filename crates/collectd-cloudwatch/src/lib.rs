// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Aggregation and flush pipeline for publishing collectd metrics to CloudWatch.
//!
//! Samples handed to [`flusher::Flusher::add_metric`] are expanded into
//! [`metric::MetricRecord`]s, aggregated per metric key for one flush window and
//! submitted in `PutMetricData` sized batches once the window elapses.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator;
pub mod builder;
pub mod client;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod dimensions;
pub mod emitter;
pub mod errors;
pub mod flusher;
pub mod metric;
pub mod sample;
pub mod scheduler;
pub mod statistics;
pub mod util;
pub mod whitelist;
