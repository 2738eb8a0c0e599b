use std::future::Future;
use std::pin::Pin;

use hyper::{service::Service, Request, Response};

use crate::recorder::Aggregator;

/// Future returned by [`HeaderMetricsService`].
pub type ObserveFuture<R, E> = Pin<Box<dyn Future<Output = Result<R, E>> + Send + 'static>>;

/// Wraps HTTP services so that every exchange they handle is observed by an [`Aggregator`].
#[derive(Clone)]
pub struct HeaderMetricsLayer {
    aggregator: Aggregator,
}

impl HeaderMetricsLayer {
    /// Creates a new [`HeaderMetricsLayer`] feeding `aggregator`.
    pub fn new(aggregator: Aggregator) -> Self {
        Self { aggregator }
    }

    /// Wraps `inner`.
    pub fn layer<S>(&self, inner: S) -> HeaderMetricsService<S> {
        HeaderMetricsService { inner, aggregator: self.aggregator.clone() }
    }
}

/// An HTTP service that observes the headers of every exchange handled by the service it wraps.
///
/// Request headers are captured before the request is handed to the inner service.  Once the inner
/// service produces a response, the exchange is observed and the response is passed through
/// untouched.  Errors from the inner service are passed through without observing anything.
#[derive(Clone)]
pub struct HeaderMetricsService<S> {
    inner: S,
    aggregator: Aggregator,
}

impl<S> HeaderMetricsService<S> {
    /// Gets a reference to the wrapped service.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Consumes the wrapper, returning the wrapped service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, B, RB> Service<Request<B>> for HeaderMetricsService<S>
where
    S: Service<Request<B>, Response = Response<RB>>,
    S::Future: Send + 'static,
    S::Error: 'static,
    RB: 'static,
{
    type Response = Response<RB>;
    type Error = S::Error;
    type Future = ObserveFuture<Response<RB>, S::Error>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let request_headers = req.headers().clone();
        let aggregator = self.aggregator.clone();
        let response = self.inner.call(req);

        Box::pin(async move {
            let response = response.await?;
            aggregator.observe(&request_headers, response.headers());
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::future::Future;

    use hyper::{service::service_fn, service::Service, Request, Response, StatusCode};

    use super::HeaderMetricsLayer;
    use crate::common::{MetricDefinition, MetricKind};
    use crate::recorder::Aggregator;

    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap_or_else(|e| panic!("Failed to create test runtime: {:?}", e))
            .block_on(future)
    }

    fn aggregator(name: &str, kind: MetricKind, headers: &[&str]) -> Aggregator {
        let headers = headers.iter().map(|h| h.to_string()).collect();
        Aggregator::new(MetricDefinition::new(name, kind, headers).unwrap())
    }

    #[test]
    fn test_observes_request_and_response_headers() {
        let aggregator = aggregator("payload_size", MetricKind::Gauge, &["X-User-ID", "X-Size"]);
        let service = HeaderMetricsLayer::new(aggregator.clone()).layer(service_fn(
            |_req: Request<String>| async move {
                let response = Response::builder().header("x-size", "2048").body(String::new());
                Ok::<_, Infallible>(response.unwrap())
            },
        ));

        let request = Request::builder().header("x-user-id", "user123").body(String::new()).unwrap();
        let response = block_on(service.call(request)).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-size"], "2048");

        let rendered = aggregator.handle().render();
        assert!(
            rendered.contains("payload_size{X-User-ID=\"user123\",X-Size=\"2048\"} 2048\n"),
            "{rendered}"
        );
    }

    #[test]
    fn test_counts_every_exchange() {
        let aggregator = aggregator("requests_by_user", MetricKind::Counter, &["X-User-ID"]);
        let layer = HeaderMetricsLayer::new(aggregator.clone());
        let service = layer.layer(service_fn(|_req: Request<String>| async move {
            Ok::<_, Infallible>(Response::new(String::from("hello")))
        }));

        block_on(async {
            for user in ["user123", "user456", "user123"] {
                let request = Request::builder().header("x-user-id", user).body(String::new());
                let response = service.call(request.unwrap()).await.unwrap();
                assert_eq!(response.into_body(), "hello");
            }
        });

        let expected = concat!(
            "# HELP requests_by_user Custom metric based on HTTP headers\n",
            "# TYPE requests_by_user counter\n",
            "requests_by_user{X-User-ID=\"user123\"} 2\n",
            "requests_by_user{X-User-ID=\"user456\"} 1\n",
        );
        assert_eq!(aggregator.handle().render(), expected);
    }

    #[test]
    fn test_inner_error_is_not_observed() {
        let aggregator = aggregator("requests_by_user", MetricKind::Counter, &["X-User-ID"]);
        let service = HeaderMetricsLayer::new(aggregator.clone()).layer(service_fn(
            |_req: Request<String>| async move { Err::<Response<String>, _>("backend unavailable") },
        ));

        let request = Request::builder().header("x-user-id", "user123").body(String::new()).unwrap();
        let result = block_on(service.call(request));
        assert_eq!(result.unwrap_err(), "backend unavailable");
        assert!(aggregator.handle().snapshot().is_empty());
    }
}
