use std::{
    convert::Infallible,
    net::SocketAddr,
    thread::{self, JoinHandle},
    time::Duration,
};

use http_body_util::Full;
use hyper::{
    body::{Bytes, Incoming},
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1::Builder as HyperHttpBuilder,
    service::service_fn,
    Request, Response, StatusCode,
};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
};
use tracing::{info, warn};

use crate::{common::BuildError, ScrapeHandle};

/// Path the scrape endpoint is served on.
pub(crate) const METRICS_PATH: &str = "/metrics";

/// Content type of the Prometheus text exposition format.
pub(crate) const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(10);

struct HttpListeningExporter {
    handle: ScrapeHandle,
}

impl HttpListeningExporter {
    async fn serve(&self, listener: std::net::TcpListener, mut stop: oneshot::Receiver<()>) {
        let listener = match TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(e) => {
                warn!("Error registering scrape listener with the runtime. Error: {:?}", e);
                return;
            }
        };

        loop {
            let stream = tokio::select! {
                // A dropped sender stops the listener just like an explicit signal.
                _ = &mut stop => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        warn!("Error accepting connection. Ignoring request. Error: {:?}", e);
                        continue;
                    }
                },
            };

            self.process_stream(stream);
        }
    }

    fn process_stream(&self, stream: TcpStream) {
        let handle = self.handle.clone();
        let service = service_fn(move |req: Request<Incoming>| {
            let handle = handle.clone();
            async move { Ok::<_, Infallible>(Self::handle_http_request(&handle, &req)) }
        });

        tokio::task::spawn(async move {
            let mut builder = HyperHttpBuilder::new();
            builder.timer(TokioTimer::new()).header_read_timeout(HEADER_READ_TIMEOUT);

            if let Err(err) = builder.serve_connection(TokioIo::new(stream), service).await {
                warn!("Error serving connection.  Error: {:?}", err);
            };
        });
    }

    fn handle_http_request(handle: &ScrapeHandle, req: &Request<Incoming>) -> Response<Full<Bytes>> {
        match req.uri().path() {
            METRICS_PATH => {
                let mut response = Response::new(Full::from(handle.render()));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_CONTENT_TYPE));
                response
            }
            _ => Self::new_not_found_response(),
        }
    }

    fn new_not_found_response() -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::<Bytes>::default());
        *response.status_mut() = StatusCode::NOT_FOUND;
        response
    }
}

/// A scrape endpoint running on its own background thread.
///
/// The listener socket is bound when the endpoint is spawned, so a busy port is reported to the
/// caller immediately.  Stopping the endpoint, either explicitly or by dropping it, waits for the
/// background thread to exit, at which point the port has been released.
pub(crate) struct ScrapeListener {
    local_addr: SocketAddr,
    stop_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ScrapeListener {
    /// Binds `listen_address` and starts serving `handle` on a background thread.
    ///
    /// # Errors
    /// Will return Err if it cannot bind to the listen address, or if the background runtime or
    /// thread cannot be created.
    pub(crate) fn spawn(
        handle: ScrapeHandle,
        listen_address: SocketAddr,
    ) -> Result<Self, BuildError> {
        let listener = std::net::TcpListener::bind(listen_address)
            .and_then(|listener| {
                listener.set_nonblocking(true)?;
                Ok(listener)
            })
            .map_err(|e| BuildError::PortInUse { addr: listen_address, reason: e.to_string() })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| BuildError::PortInUse { addr: listen_address, reason: e.to_string() })?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BuildError::FailedToCreateRuntime(e.to_string()))?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let exporter = HttpListeningExporter { handle };

        let thread = thread::Builder::new()
            .name(format!("metrics-exporter-headers-{}", local_addr.port()))
            .spawn(move || {
                runtime.block_on(async move { exporter.serve(listener, stop_rx).await });
                // Dropping the runtime here also cancels any in-flight connections.
            })
            .map_err(|e| BuildError::FailedToCreateRuntime(e.to_string()))?;

        info!(address = %local_addr, path = METRICS_PATH, "scrape endpoint listening");

        Ok(Self { local_addr, stop_tx: Some(stop_tx), thread: Some(thread) })
    }

    /// Gets the address the endpoint is bound to.
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits for the background thread to exit.
    ///
    /// Calling this more than once has no further effect.
    pub(crate) fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The receiver is gone only if the thread already exited.
            let _ = stop_tx.send(());
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(address = %self.local_addr, "scrape endpoint thread panicked");
            } else {
                info!(address = %self.local_addr, "scrape endpoint stopped");
            }
        }
    }
}

impl Drop for ScrapeListener {
    fn drop(&mut self) {
        self.stop();
    }
}
