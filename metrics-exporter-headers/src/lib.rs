//! Collects metrics from HTTP headers and exposes them in the Prometheus exposition format.
//!
//! Every HTTP exchange seen by the collector is reduced to a single metric observation: the values
//! of a configured list of headers (looked up on the request first, then on the response) become
//! the labels of a series, and the series is updated according to the configured metric kind.
//!
//! # Metric kinds
//! - `counter`: each exchange adds one to its series.
//! - `gauge`: the series holds the first numeric value found among the configured headers, or `1`
//!   if none of them were numeric.
//! - `histogram`: same update rule as `gauge`.  No buckets are kept; the series holds the most
//!   recent observation.
//!
//! # Usage
//! A [`HeaderMetricsBuilder`] validates the configuration and, with the default `http-listener`
//! feature, spawns a background scrape endpoint serving `/metrics`:
//!
//! ```no_run
//! # use metrics_exporter_headers::{HeaderMetricsBuilder, MetricKind};
//! # use hyper::HeaderMap;
//! let mut metrics = HeaderMetricsBuilder::new()
//!     .with_headers(["X-User-ID"])
//!     .with_metric_name("requests_by_user")
//!     .with_metric_kind(MetricKind::Counter)
//!     .with_listen_port(9091)
//!     .build()
//!     .expect("failed to start header metrics");
//!
//! let mut request = HeaderMap::new();
//! request.insert("x-user-id", "user123".parse().unwrap());
//! metrics.observe(&request, &HeaderMap::new());
//!
//! metrics.stop();
//! ```
//!
//! If the scrape endpoint is served by an existing HTTP server instead, use
//! [`HeaderMetricsBuilder::build_recorder`] and render through a [`ScrapeHandle`]:
//!
//! ```
//! # use metrics_exporter_headers::{HeaderMetricsBuilder, MetricKind};
//! # use hyper::HeaderMap;
//! let aggregator = HeaderMetricsBuilder::new()
//!     .with_headers(["X-Size"])
//!     .with_metric_name("payload_size")
//!     .with_metric_kind(MetricKind::Gauge)
//!     .build_recorder()
//!     .unwrap();
//!
//! let mut request = HeaderMap::new();
//! request.insert("x-size", "1024".parse().unwrap());
//! aggregator.observe(&request, &HeaderMap::new());
//!
//! let rendered = aggregator.handle().render();
//! assert!(rendered.contains("payload_size{X-Size=\"1024\"} 1024\n"));
//! ```
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod common;
pub use self::common::{BuildError, CounterPolicy, MetricDefinition, MetricKind};

mod config;
pub use self::config::Config;

pub mod formatting;

mod identity;
pub use self::identity::{series_key, HeaderSource, LabelSet};

mod registry;
pub use self::registry::{MetricSeries, MetricStore};

mod recorder;
pub use self::recorder::{Aggregator, ScrapeHandle};

mod exporter;
pub use self::exporter::builder::HeaderMetricsBuilder;
#[cfg(feature = "http-listener")]
pub use self::exporter::HeaderMetrics;

mod service;
pub use self::service::{HeaderMetricsLayer, HeaderMetricsService, ObserveFuture};
