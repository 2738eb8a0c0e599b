#[cfg(feature = "http-listener")]
use std::net::SocketAddr;

#[cfg(feature = "http-listener")]
use crate::{
    identity::HeaderSource,
    recorder::{Aggregator, ScrapeHandle},
    service::HeaderMetricsLayer,
};

#[cfg(feature = "http-listener")]
mod http_listener;
#[cfg(feature = "http-listener")]
use http_listener::ScrapeListener;

pub(crate) mod builder;

/// A configured header metrics collector with its own scrape endpoint.
///
/// Created by [`HeaderMetricsBuilder::build`][crate::HeaderMetricsBuilder::build].  Each instance
/// owns an independent metric store; several instances with different configurations can run in
/// one process as long as they listen on different ports.
///
/// The scrape endpoint serves `GET /metrics` until [`stop`][HeaderMetrics::stop] is called or the
/// collector is dropped.
#[cfg(feature = "http-listener")]
#[cfg_attr(docsrs, doc(cfg(feature = "http-listener")))]
pub struct HeaderMetrics {
    aggregator: Aggregator,
    listener: ScrapeListener,
}

#[cfg(feature = "http-listener")]
impl HeaderMetrics {
    pub(crate) fn new(aggregator: Aggregator, listener: ScrapeListener) -> Self {
        Self { aggregator, listener }
    }

    /// Observes one exchange.
    ///
    /// See [`Aggregator::observe`].
    pub fn observe<Req, Resp>(&self, request: &Req, response: &Resp)
    where
        Req: HeaderSource + ?Sized,
        Resp: HeaderSource + ?Sized,
    {
        self.aggregator.observe(request, response);
    }

    /// Returns the collected metrics in the Prometheus text exposition format.
    ///
    /// This is exactly the body served by the scrape endpoint.
    pub fn render(&self) -> String {
        self.aggregator.handle().render()
    }

    /// Gets the [`Aggregator`] feeding this collector.
    pub fn aggregator(&self) -> Aggregator {
        self.aggregator.clone()
    }

    /// Gets a [`ScrapeHandle`] to this collector's store.
    pub fn handle(&self) -> ScrapeHandle {
        self.aggregator.handle()
    }

    /// Gets a [`HeaderMetricsLayer`] that feeds every exchange of a wrapped service into this
    /// collector.
    pub fn layer(&self) -> HeaderMetricsLayer {
        HeaderMetricsLayer::new(self.aggregator.clone())
    }

    /// Gets the address the scrape endpoint is bound to.
    ///
    /// Useful when the collector was configured with port `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Stops the scrape endpoint.
    ///
    /// Returns once the endpoint no longer accepts connections and its port has been released.
    /// Collected metrics stay available through [`render`][HeaderMetrics::render] and existing
    /// handles.  Calling `stop` again has no further effect.
    pub fn stop(&mut self) {
        self.listener.stop();
    }
}
