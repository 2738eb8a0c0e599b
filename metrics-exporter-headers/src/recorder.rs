use std::sync::Arc;

use crate::common::{CounterPolicy, MetricDefinition, MetricKind};
use crate::formatting;
use crate::identity::{series_key, HeaderSource, LabelSet};
use crate::registry::{MetricSeries, MetricStore};

/// Value recorded by gauges and histograms when none of the configured headers are numeric.
const NON_NUMERIC_SENTINEL: f64 = 1.0;

pub(crate) struct Inner {
    pub definition: MetricDefinition,
    pub store: MetricStore,
    pub counter_policy: CounterPolicy,
}

impl Inner {
    fn observe<Req, Resp>(&self, request: &Req, response: &Resp)
    where
        Req: HeaderSource + ?Sized,
        Resp: HeaderSource + ?Sized,
    {
        let definition = &self.definition;
        let kind = definition.kind();
        let labels = LabelSet::resolve(definition.headers(), request, response);

        let value = match kind {
            MetricKind::Counter => {
                if self.counter_policy == CounterPolicy::HeaderPresent && !labels.any_present() {
                    return;
                }
                None
            }
            MetricKind::Gauge | MetricKind::Histogram => {
                Some(numeric_value(definition.headers(), request, response))
            }
        };

        let key = series_key(definition.name(), &labels);
        self.store.update(key, definition.name(), kind, labels, |series| match value {
            Some(value) => series.set(value),
            None => series.increment(),
        });
    }

    fn render(&self) -> String {
        formatting::render(&self.store.snapshot())
    }
}

/// Finds the first configured header that parses as a number.
///
/// All configured headers are tried on the request, in order, before any are tried on the
/// response.
fn numeric_value<Req, Resp>(headers: &[String], request: &Req, response: &Resp) -> f64
where
    Req: HeaderSource + ?Sized,
    Resp: HeaderSource + ?Sized,
{
    let parse = |value: &str| value.parse::<f64>().ok();

    headers
        .iter()
        .find_map(|name| request.header(name).and_then(parse))
        .or_else(|| headers.iter().find_map(|name| response.header(name).and_then(parse)))
        .unwrap_or(NON_NUMERIC_SENTINEL)
}

/// Derives one metric observation from each HTTP exchange.
///
/// The aggregator owns the metric store of a single configured collector.  It is cheap to clone,
/// and all clones update the same store, so one can be handed to every worker that sees
/// exchanges.
#[derive(Clone)]
pub struct Aggregator {
    inner: Arc<Inner>,
}

impl Aggregator {
    /// Creates a new [`Aggregator`] for `definition`, counting every exchange and keeping an
    /// unbounded number of series.
    ///
    /// [`HeaderMetricsBuilder`][crate::HeaderMetricsBuilder] exposes the remaining options.
    pub fn new(definition: MetricDefinition) -> Self {
        Self::from(Inner {
            definition,
            store: MetricStore::new(),
            counter_policy: CounterPolicy::default(),
        })
    }

    /// Observes one exchange.
    ///
    /// Each configured header is looked up on `request` first, then on `response`; the resulting
    /// labels select the series, which is then updated according to the metric kind.  Header
    /// values that are not numeric are skipped when looking for a gauge or histogram value.
    ///
    /// This never fails: an exchange either updates exactly one series or, when a counter policy or
    /// series limit excludes it, updates nothing.
    pub fn observe<Req, Resp>(&self, request: &Req, response: &Resp)
    where
        Req: HeaderSource + ?Sized,
        Resp: HeaderSource + ?Sized,
    {
        self.inner.observe(request, response);
    }

    /// Gets the definition this aggregator records.
    pub fn definition(&self) -> &MetricDefinition {
        &self.inner.definition
    }

    /// Gets a [`ScrapeHandle`] to this aggregator's store.
    pub fn handle(&self) -> ScrapeHandle {
        ScrapeHandle { inner: self.inner.clone() }
    }
}

impl From<Inner> for Aggregator {
    fn from(inner: Inner) -> Self {
        Aggregator { inner: Arc::new(inner) }
    }
}

/// Handle to an [`Aggregator`]'s store.
///
/// Useful for exposing a scrape endpoint on an existing HTTP/HTTPS server.
#[derive(Clone)]
pub struct ScrapeHandle {
    inner: Arc<Inner>,
}

impl ScrapeHandle {
    /// Returns the collected metrics in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.inner.render()
    }

    /// Gets a copy of every series collected so far.
    pub fn snapshot(&self) -> Vec<MetricSeries> {
        self.inner.store.snapshot()
    }
}
