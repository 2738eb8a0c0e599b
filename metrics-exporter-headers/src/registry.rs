use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::{map::Entry, IndexMap};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::common::MetricKind;
use crate::identity::LabelSet;

/// The accumulated state of one label combination of a metric.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricSeries {
    name: String,
    kind: MetricKind,
    value: f64,
    labels: LabelSet,
}

impl MetricSeries {
    fn new(name: &str, kind: MetricKind, labels: LabelSet) -> Self {
        Self { name: name.to_string(), kind, value: 0.0, labels }
    }

    /// Gets the metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the metric kind.
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Gets the current value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Gets the labels identifying this series.
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub(crate) fn increment(&mut self) {
        self.value += 1.0;
    }

    pub(crate) fn set(&mut self, value: f64) {
        self.value = value;
    }
}

/// Label-keyed storage for metric series.
///
/// Series are created on first use and are never removed.  Creation and updates happen under a
/// single exclusive lock, so concurrent callers racing on the same key always converge on one
/// series and never lose an update.  Snapshots take the shared lock and therefore only ever see
/// fully constructed series.
///
/// Series are kept in the order they were first created.
#[derive(Debug, Default)]
pub struct MetricStore {
    series: RwLock<IndexMap<String, MetricSeries>>,
    max_series: Option<NonZeroUsize>,
    overflowed: AtomicBool,
}

impl MetricStore {
    /// Creates an empty [`MetricStore`] with no limit on the number of series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty [`MetricStore`] that holds at most `max_series` series.
    ///
    /// Once the limit is reached, observations for label combinations that do not already have a
    /// series are dropped.  Existing series keep updating.
    pub fn with_max_series(max_series: NonZeroUsize) -> Self {
        Self { max_series: Some(max_series), ..Self::default() }
    }

    /// Gets the series stored under `key`, creating a zero-valued one if it does not exist yet.
    ///
    /// Returns `None` only if the series would have to be created and the store is full.
    pub fn get_or_create(
        &self,
        key: &str,
        name: &str,
        kind: MetricKind,
        labels: &LabelSet,
    ) -> Option<MetricSeries> {
        let mut found = None;
        self.update(key.to_string(), name, kind, labels.clone(), |series| {
            found = Some(series.clone());
        });
        found
    }

    /// Gets or creates the series stored under `key` and applies `op` to it.
    ///
    /// Lookup, creation, and `op` all run while holding the exclusive lock.  `name`, `kind`, and
    /// `labels` are only used when the series has to be created.
    ///
    /// Returns `false` if the observation was dropped because the store is full.
    pub fn update<F>(
        &self,
        key: String,
        name: &str,
        kind: MetricKind,
        labels: LabelSet,
        op: F,
    ) -> bool
    where
        F: FnOnce(&mut MetricSeries),
    {
        let mut series = self.series.write();
        let len = series.len();

        match series.entry(key) {
            Entry::Occupied(mut entry) => {
                op(entry.get_mut());
                true
            }
            Entry::Vacant(entry) => {
                if self.max_series.is_some_and(|max| len >= max.get()) {
                    // Only the first drop is logged; a full store drops on every new combination.
                    if !self.overflowed.swap(true, Ordering::Relaxed) {
                        warn!(
                            metric = name,
                            max_series = len,
                            "series limit reached, dropping observations for new label combinations"
                        );
                    }
                    return false;
                }

                debug!(metric = name, key = entry.key().as_str(), "creating new series");
                op(entry.insert(MetricSeries::new(name, kind, labels)));
                true
            }
        }
    }

    /// Gets a copy of every series, in creation order.
    pub fn snapshot(&self) -> Vec<MetricSeries> {
        self.series.read().values().cloned().collect()
    }

    /// Gets the number of series held.
    pub fn len(&self) -> usize {
        self.series.read().len()
    }

    /// Returns `true` if no series have been created yet.
    pub fn is_empty(&self) -> bool {
        self.series.read().is_empty()
    }
}
