use std::convert::Infallible;
use std::net::SocketAddr;

use http_body_util::Full;
use hyper::{
    body::{Bytes, Incoming},
    server::conn::http1,
    service::service_fn,
    Request, Response,
};
use hyper_util::rt::TokioIo;
use metrics_exporter_headers::{HeaderMetricsBuilder, MetricKind};
use tokio::net::TcpListener;
use tracing::{info, warn};

async fn hello(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let user = req.headers().get("x-user-id").and_then(|v| v.to_str().ok()).unwrap_or("stranger");
    let body = format!("hello, {user}!\n");

    let response = Response::builder()
        .header("x-response-size", body.len())
        .body(Full::from(body))
        .unwrap_or_else(|_| Response::new(Full::default()));
    Ok(response)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    // Scrape with `curl http://127.0.0.1:9091/metrics` after sending a few requests such as
    // `curl -H 'X-User-ID: user123' http://127.0.0.1:3000/`.
    let metrics = HeaderMetricsBuilder::new()
        .with_headers(["X-User-ID"])
        .with_metric_name("requests_by_user")
        .with_metric_kind(MetricKind::Counter)
        .with_listen_address(SocketAddr::from(([127, 0, 0, 1], 9091)))
        .build()
        .expect("failed to start header metrics");

    let service = metrics.layer().layer(service_fn(hello));

    let address = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = TcpListener::bind(address).await.expect("failed to bind application port");
    info!(%address, "application listening");

    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!("Error accepting connection. Ignoring request. Error: {:?}", e);
                continue;
            }
        };

        let service = service.clone();
        tokio::spawn(async move {
            let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
            if let Err(err) = connection.await {
                warn!("Error serving connection.  Error: {:?}", err);
            }
        });
    }
}
