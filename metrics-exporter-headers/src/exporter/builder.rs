use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;

use tracing::debug;

use crate::common::{BuildError, CounterPolicy, MetricDefinition, MetricKind};
use crate::config::Config;
use crate::recorder::{Aggregator, Inner};
use crate::registry::MetricStore;

#[cfg(feature = "http-listener")]
use super::{http_listener::ScrapeListener, HeaderMetrics};

const DEFAULT_METRIC_NAME: &str = "plugin_custom_requests";
const DEFAULT_LISTEN_PORT: u16 = 8081;

/// Builder for creating a header metrics collector and its scrape endpoint.
#[derive(Clone, Debug)]
pub struct HeaderMetricsBuilder {
    headers: Vec<String>,
    metric_name: String,
    metric_kind: MetricKind,
    #[cfg_attr(not(feature = "http-listener"), allow(dead_code))]
    listen_address: SocketAddr,
    counter_policy: CounterPolicy,
    max_series: Option<NonZeroUsize>,
}

impl HeaderMetricsBuilder {
    /// Creates a new [`HeaderMetricsBuilder`].
    ///
    /// Defaults to a counter named `plugin_custom_requests`, with a scrape endpoint listening at
    /// `0.0.0.0:8081`.  No headers are configured, so at least one must be added with
    /// [`with_headers`][HeaderMetricsBuilder::with_headers] before building.
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
            metric_name: DEFAULT_METRIC_NAME.to_string(),
            metric_kind: MetricKind::Counter,
            listen_address: SocketAddr::new(
                IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
                DEFAULT_LISTEN_PORT,
            ),
            counter_policy: CounterPolicy::default(),
            max_series: None,
        }
    }

    /// Creates a [`HeaderMetricsBuilder`] from host-facing configuration.
    ///
    /// The scrape endpoint listens on all interfaces at `metricsPort`.
    ///
    /// ## Errors
    ///
    /// If the metric type or counter policy are not recognized, or `maxSeries` is zero, an error
    /// variant will be returned describing the error.  Empty headers or an empty name are reported
    /// when building.
    pub fn from_config(config: &Config) -> Result<Self, BuildError> {
        let metric_kind = config.metric_type.parse::<MetricKind>()?;
        let counter_policy = config.counter_policy.parse::<CounterPolicy>()?;
        let max_series = match config.max_series {
            None => None,
            Some(max) => Some(NonZeroUsize::new(max).ok_or(BuildError::InvalidMaxSeries)?),
        };

        let builder = Self {
            headers: config.metric_headers.clone(),
            metric_name: config.metric_name.clone(),
            metric_kind,
            counter_policy,
            max_series,
            ..Self::new()
        };

        Ok(builder.with_listen_port(config.metrics_port))
    }

    /// Sets the header names whose values become the labels of each series.
    ///
    /// Label names are the header names exactly as given here, in this order.  Header lookups are
    /// case-insensitive.
    #[must_use]
    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the metric name.
    ///
    /// Defaults to `plugin_custom_requests`.
    #[must_use]
    pub fn with_metric_name<N: Into<String>>(mut self, name: N) -> Self {
        self.metric_name = name.into();
        self
    }

    /// Sets the metric kind.
    ///
    /// Defaults to [`MetricKind::Counter`].
    #[must_use]
    pub fn with_metric_kind(mut self, kind: MetricKind) -> Self {
        self.metric_kind = kind;
        self
    }

    /// Sets the port of the scrape endpoint, keeping the configured IP address.
    ///
    /// A port of `0` asks the operating system for a free port; the bound address is available
    /// from [`HeaderMetrics::local_addr`] after building.
    ///
    /// Defaults to `8081`.
    #[must_use]
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_address.set_port(port);
        self
    }

    /// Sets the full address of the scrape endpoint.
    ///
    /// Defaults to `0.0.0.0:8081`.
    #[must_use]
    pub fn with_listen_address(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.listen_address = addr.into();
        self
    }

    /// Sets which exchanges a counter counts.
    ///
    /// Has no effect on gauges and histograms.  Defaults to [`CounterPolicy::EveryExchange`].
    #[must_use]
    pub fn with_counter_policy(mut self, policy: CounterPolicy) -> Self {
        self.counter_policy = policy;
        self
    }

    /// Caps the number of series the collector keeps.
    ///
    /// Once the cap is reached, exchanges that would create a new series are dropped; existing
    /// series keep updating.  Defaults to no cap.
    #[must_use]
    pub fn with_max_series(mut self, max_series: NonZeroUsize) -> Self {
        self.max_series = Some(max_series);
        self
    }

    /// Builds the collector and starts its scrape endpoint on a background thread.
    ///
    /// The endpoint listens until [`HeaderMetrics::stop`] is called or the collector is dropped.
    ///
    /// ## Errors
    ///
    /// If the configuration is invalid, or the listen address cannot be bound, an error variant
    /// will be returned describing the error.
    #[cfg(feature = "http-listener")]
    #[cfg_attr(docsrs, doc(cfg(feature = "http-listener")))]
    pub fn build(self) -> Result<HeaderMetrics, BuildError> {
        let listen_address = self.listen_address;
        let aggregator = self.build_recorder()?;
        let listener = ScrapeListener::spawn(aggregator.handle(), listen_address)?;

        Ok(HeaderMetrics::new(aggregator, listener))
    }

    /// Builds the collector without a scrape endpoint.
    ///
    /// Render the collected metrics through [`Aggregator::handle`] to serve them from an existing
    /// HTTP server.
    ///
    /// ## Errors
    ///
    /// If no headers are configured, a header is configured twice, or the metric name is empty, an
    /// error variant will be returned describing the error.
    pub fn build_recorder(self) -> Result<Aggregator, BuildError> {
        let definition = MetricDefinition::new(self.metric_name, self.metric_kind, self.headers)?;
        let store = match self.max_series {
            Some(max_series) => MetricStore::with_max_series(max_series),
            None => MetricStore::new(),
        };

        debug!(
            metric = definition.name(),
            kind = definition.kind().as_str(),
            headers = ?definition.headers(),
            counter_policy = self.counter_policy.as_str(),
            "built header metrics collector",
        );

        Ok(Aggregator::from(Inner { definition, store, counter_policy: self.counter_policy }))
    }
}

impl Default for HeaderMetricsBuilder {
    fn default() -> Self {
        HeaderMetricsBuilder::new()
    }
}
