use serde::Deserialize;

/// Host-facing configuration for a header metrics collector.
///
/// Field names follow the host's camelCase convention (`metricHeaders`, `metricName`,
/// `metricType`, `metricsPort`, `counterPolicy`, `maxSeries`), and every field is optional when
/// deserializing.  Validation happens when the configuration is turned into a builder with
/// [`HeaderMetricsBuilder::from_config`][crate::HeaderMetricsBuilder::from_config].
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Header names whose values become the labels of each series.
    pub metric_headers: Vec<String>,

    /// Metric name, used verbatim in the exposition output.
    pub metric_name: String,

    /// Metric kind: `counter`, `gauge`, or `histogram`.
    pub metric_type: String,

    /// Port of the scrape endpoint.  `0` asks the operating system for a free port.
    pub metrics_port: u16,

    /// Which exchanges counters count: `every_exchange` or `header_present`.
    pub counter_policy: String,

    /// Maximum number of series to keep, if any.
    pub max_series: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metric_headers: Vec::new(),
            metric_name: "plugin_custom_requests".to_string(),
            metric_type: "counter".to_string(),
            metrics_port: 8081,
            counter_policy: "every_exchange".to_string(),
            max_series: None,
        }
    }
}
