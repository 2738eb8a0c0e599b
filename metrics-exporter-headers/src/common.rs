use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error as ThisError;

/// The kind of metric a definition produces.
///
/// The kind decides how an observed exchange updates its series and which `# TYPE` is emitted for
/// the metric when rendering.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MetricKind {
    /// Incremented by one for every counted exchange.
    Counter,
    /// Set to the first numeric header value of the most recent exchange.
    Gauge,
    /// Same update rule as [`MetricKind::Gauge`]; no buckets are maintained.
    Histogram,
}

impl MetricKind {
    /// Gets the name of this kind as used in configuration and in `# TYPE` lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            "histogram" => Ok(MetricKind::Histogram),
            other => Err(BuildError::UnsupportedMetricKind(other.to_string())),
        }
    }
}

/// Decides which exchanges a counter counts.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum CounterPolicy {
    /// Every exchange is counted, even if none of the configured headers were present.
    #[default]
    EveryExchange,
    /// Only exchanges where at least one configured header carried a non-empty value are counted.
    HeaderPresent,
}

impl CounterPolicy {
    /// Gets the name of this policy as used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterPolicy::EveryExchange => "every_exchange",
            CounterPolicy::HeaderPresent => "header_present",
        }
    }
}

impl FromStr for CounterPolicy {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "every_exchange" => Ok(CounterPolicy::EveryExchange),
            "header_present" => Ok(CounterPolicy::HeaderPresent),
            other => Err(BuildError::UnsupportedCounterPolicy(other.to_string())),
        }
    }
}

/// Which metric to derive from each exchange, and from which headers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MetricDefinition {
    name: String,
    kind: MetricKind,
    headers: Vec<String>,
}

impl MetricDefinition {
    /// Creates a new [`MetricDefinition`].
    ///
    /// `headers` is kept in the given order, which is the order labels are keyed and rendered in.
    ///
    /// ## Errors
    ///
    /// Returns an error if `name` is empty, if `headers` is empty, or if `headers` names the same
    /// header twice (compared case-insensitively).
    pub fn new<N>(name: N, kind: MetricKind, headers: Vec<String>) -> Result<Self, BuildError>
    where
        N: Into<String>,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(BuildError::EmptyMetricName);
        }
        if headers.is_empty() {
            return Err(BuildError::EmptyHeaders);
        }
        // Header names are case-insensitive, so `X-A` and `x-a` are the same label.
        for (i, header) in headers.iter().enumerate() {
            if headers[..i].iter().any(|seen| seen.eq_ignore_ascii_case(header)) {
                return Err(BuildError::DuplicateHeader(header.clone()));
            }
        }

        Ok(Self { name, kind, headers })
    }

    /// Gets the metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the metric kind.
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Gets the observed header names, in configured order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

/// Errors that could occur while building a header metrics collector or its scrape endpoint.
#[derive(Debug, ThisError)]
pub enum BuildError {
    /// No header names were configured.
    #[error("metric headers cannot be empty")]
    EmptyHeaders,

    /// The same header name was configured more than once, ignoring case.
    #[error("duplicate metric header: {0}")]
    DuplicateHeader(String),

    /// The metric name was empty.
    #[error("metric name cannot be empty")]
    EmptyMetricName,

    /// The metric kind was not one of `counter`, `gauge`, or `histogram`.
    #[error("unsupported metric type: {0}")]
    UnsupportedMetricKind(String),

    /// The counter policy was not one of `every_exchange` or `header_present`.
    #[error("unsupported counter policy: {0}")]
    UnsupportedCounterPolicy(String),

    /// The series cap was set to zero.
    #[error("max series must be greater than zero")]
    InvalidMaxSeries,

    /// The scrape endpoint could not bind its listen address.
    #[error("address {addr} is already in use: {reason}")]
    PortInUse {
        /// Address the listener tried to bind.
        addr: SocketAddr,
        /// Details about the bind failure.
        reason: String,
    },

    /// The background runtime or thread for the scrape endpoint could not be created.
    #[error("failed to create runtime for scrape endpoint: {0}")]
    FailedToCreateRuntime(String),
}
