//! Exposition Endpoint
//!
//! Serves `GET /metrics` over HTTP/1. Every request collects a fresh
//! snapshot from the registry on its own blocking thread and streams the
//! encoded text back as it is produced. `HEAD /metrics` collects the same
//! way and answers with the headers only.
//!
//! ```text
//! request ─▶ spawn_blocking(collect) ─▶ 200 + headers
//!                                        │
//!            spawn_blocking(encode) ─▶ BufWriter ─▶ channel ─▶ response body
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::io::{self, BufWriter, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::exposition::TextEncoder;
use crate::model::Snapshot;
use crate::registry::Registry;

/// Path of the exposition endpoint
pub const METRICS_PATH: &str = "/metrics";

/// Bytes buffered by the encoder before a chunk is handed to the response
const CHUNK_SIZE: usize = 8 * 1024;

/// Chunks in flight between the encoder thread and the connection
const CHANNEL_CAPACITY: usize = 16;

/// Response body: either a fixed message or the streamed exposition text
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

// =============================================================================
// Server
// =============================================================================

struct ServerState {
    registry: Arc<Registry>,
    encoder: TextEncoder,
}

/// HTTP server exposing a [`Registry`]
pub struct MetricsServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl MetricsServer {
    /// Bind the listening socket. Port 0 picks a free port.
    pub async fn bind(addr: SocketAddr, registry: Arc<Registry>, encoder: TextEncoder) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Server(format!("Failed to bind metrics server on {}: {}", addr, e)))?;

        Ok(Self {
            listener,
            state: Arc::new(ServerState { registry, encoder }),
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` resolves. Connections already accepted run to completion.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let addr = self.local_addr()?;
        info!("Metrics server listening on {}", addr);

        tokio::pin!(shutdown);
        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    info!("Metrics server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Metrics server accept error: {}", e);
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let service = service_fn(move |req| handle(req, Arc::clone(&state)));
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(%peer, "Metrics server connection error: {}", e);
                }
            });
        }
    }
}

// =============================================================================
// Handler
// =============================================================================

async fn handle<B>(
    req: Request<B>,
    state: Arc<ServerState>,
) -> std::result::Result<Response<ResponseBody>, Infallible> {
    if req.uri().path() != METRICS_PATH {
        return Ok(plain_response(StatusCode::NOT_FOUND, "not found"));
    }

    let response = match req.method() {
        &Method::GET => serve_metrics(&state.registry, state.encoder).await,
        &Method::HEAD => match collect_snapshot(&state.registry).await {
            Ok(_) => exposition_response(state.encoder, empty_body()),
            Err(response) => response,
        },
        _ => {
            let mut response =
                plain_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            response
        }
    };
    Ok(response)
}

/// Collect, then stream the encoded snapshot.
///
/// A failed collection is answered with 500 since nothing has been sent yet.
/// Once the 200 head is out, a failed write (client gone) only ends the body.
pub async fn serve_metrics(registry: &Arc<Registry>, encoder: TextEncoder) -> Response<ResponseBody> {
    let snapshot = match collect_snapshot(registry).await {
        Ok(snapshot) => snapshot,
        Err(response) => return response,
    };
    debug!(families = snapshot.len(), "Serving scrape");

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::task::spawn_blocking(move || stream_snapshot(&snapshot, encoder, tx));

    let chunks = stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok::<_, io::Error>(Frame::data(chunk)), rx))
    });

    exposition_response(encoder, StreamBody::new(chunks).boxed_unsync())
}

/// Collect and validate on a blocking thread. On failure the 500 response
/// to send is returned instead.
async fn collect_snapshot(
    registry: &Arc<Registry>,
) -> std::result::Result<Snapshot, Response<ResponseBody>> {
    let registry = Arc::clone(registry);
    let collected = tokio::task::spawn_blocking(move || {
        let snapshot = registry.collect()?;
        snapshot.validate()?;
        Ok::<_, Error>(snapshot)
    })
    .await;

    match collected {
        Ok(Ok(snapshot)) => Ok(snapshot),
        Ok(Err(e)) => {
            error!("Scrape failed: {}", e);
            Err(plain_response(StatusCode::INTERNAL_SERVER_ERROR, "scrape failed"))
        }
        Err(e) => {
            error!("Scrape task aborted: {}", e);
            Err(plain_response(StatusCode::INTERNAL_SERVER_ERROR, "scrape failed"))
        }
    }
}

fn stream_snapshot(snapshot: &Snapshot, encoder: TextEncoder, tx: mpsc::Sender<Bytes>) {
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, ChannelWriter { tx });
    let result = encoder
        .encode(snapshot, &mut writer)
        .and_then(|_| writer.flush().map_err(Error::from));

    if let Err(e) = result {
        warn!("Metrics stream aborted: {}", e);
    }
}

fn exposition_response(encoder: TextEncoder, body: ResponseBody) -> Response<ResponseBody> {
    let mut response = Response::new(body);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(encoder.format_type()));
    response
}

fn empty_body() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn plain_response(status: StatusCode, message: &'static str) -> Response<ResponseBody> {
    let body: ResponseBody = Full::new(Bytes::from_static(message.as_bytes()))
        .map_err(|never| match never {})
        .boxed_unsync();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

// =============================================================================
// Channel Writer
// =============================================================================

/// Blocking [`Write`] sink feeding a response body. Must be used off the
/// async runtime threads.
struct ChannelWriter {
    tx: mpsc::Sender<Bytes>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .blocking_send(Bytes::copy_from_slice(buf))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "metrics response closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MetricFamily, MetricType, Sample};
    use crate::registry::Collector;

    struct UpCollector;

    impl Collector for UpCollector {
        fn collect(&self) -> Result<Vec<MetricFamily>> {
            Ok(vec![MetricFamily::new("up", "1 if target is up", MetricType::Gauge)
                .with_sample(Sample::new("up", 1.0))])
        }
    }

    struct BrokenCollector;

    impl Collector for BrokenCollector {
        fn collect(&self) -> Result<Vec<MetricFamily>> {
            Err(Error::Collector {
                collector: "broken".to_string(),
                reason: "boom".to_string(),
            })
        }
    }

    fn empty_state() -> Arc<ServerState> {
        Arc::new(ServerState {
            registry: Arc::new(Registry::new()),
            encoder: TextEncoder::new(),
        })
    }

    fn request(method: Method, uri: &str) -> Request<()> {
        Request::builder().method(method).uri(uri).body(()).unwrap()
    }

    async fn body_string(response: Response<ResponseBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_get_metrics() {
        let state = empty_state();
        state.registry.register(Arc::new(UpCollector));

        let response = handle(request(Method::GET, "/metrics"), state).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
        assert_eq!(
            body_string(response).await,
            "# HELP up 1 if target is up\n# TYPE up gauge\nup 1\n"
        );
    }

    #[tokio::test]
    async fn test_empty_registry_returns_empty_body() {
        let state = empty_state();

        let response = handle(request(Method::GET, "/metrics?name[]=up"), state)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "");
    }

    #[tokio::test]
    async fn test_collector_failure_is_server_error() {
        let state = empty_state();
        state.registry.register(Arc::new(UpCollector));
        state.registry.register(Arc::new(BrokenCollector));

        let response = handle(request(Method::GET, "/metrics"), state).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_invalid_snapshot_is_server_error() {
        let state = empty_state();
        state.registry.register(Arc::new(|| -> Result<Vec<MetricFamily>> {
            Ok(vec![MetricFamily::new("bad", "", MetricType::Gauge).with_sample(
                Sample::with_labels("bad", vec!["a".into()], vec![], 1.0),
            )])
        }));

        let response = handle(request(Method::GET, "/metrics"), state).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_head_collects_without_body() {
        let state = empty_state();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        state.registry.register(Arc::new(move || -> Result<Vec<MetricFamily>> {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![MetricFamily::new("up", "", MetricType::Gauge)
                .with_sample(Sample::new("up", 1.0))])
        }));

        let response = handle(request(Method::HEAD, "/metrics"), Arc::clone(&state))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
        assert_eq!(body_string(response).await, "");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        state.registry.register(Arc::new(BrokenCollector));
        let response = handle(request(Method::HEAD, "/metrics"), state).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_other_methods_and_paths() {
        let state = empty_state();

        let response = handle(request(Method::POST, "/metrics"), Arc::clone(&state))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, HEAD");

        let response = handle(request(Method::GET, "/"), state).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_large_snapshot_streams_in_chunks() {
        let state = empty_state();
        state.registry.register(Arc::new(|| -> Result<Vec<MetricFamily>> {
            let mut family = MetricFamily::new("series", "many samples", MetricType::Counter);
            for i in 0..5_000 {
                family
                    .samples
                    .push(Sample::new("series_total", i as f64).with_label("id", i.to_string()));
            }
            Ok(vec![family])
        }));

        let response = handle(request(Method::GET, "/metrics"), state).await.unwrap();
        let body = body_string(response).await;

        assert_eq!(body.lines().count(), 5_002);
        assert!(body.ends_with("series_total{id=\"4999\",} 4999\n"));
    }
}
