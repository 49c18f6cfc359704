//! JSON-RPC Server
//!
//! HTTP/1.1 listener over TCP. Requests on the RPC path go to the front
//! door; `GET` on the metrics path returns the exposition text.

use crate::error::ServerError;
use crate::front_door::{FrontDoor, HttpReply, InboundRequest};
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9527;
const DEFAULT_RPC_PATH: &str = "/";
const DEFAULT_METRICS_PATH: &str = "/metrics";
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Prometheus text format
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Renders the current metrics exposition
pub type MetricsRenderer = Arc<dyn Fn() -> String + Send + Sync>;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    /// 0 binds an ephemeral port
    pub port: u16,
    pub rpc_path: String,
    pub metrics_path: String,
    /// Larger RPC bodies get 413 without being buffered
    pub max_body_bytes: usize,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

struct Routes {
    front_door: Arc<FrontDoor>,
    rpc_path: String,
    metrics_path: String,
    max_body_bytes: usize,
    metrics: Option<MetricsRenderer>,
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    front_door: Arc<FrontDoor>,
    metrics: Option<MetricsRenderer>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, front_door: FrontDoor) -> Self {
        Self {
            config,
            front_door: Arc::new(front_door),
            metrics: None,
        }
    }

    /// Serve `render()` on the metrics path
    pub fn with_metrics(mut self, render: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.metrics = Some(Arc::new(render));
        self
    }

    /// Bind and start accepting connections
    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!(
            addr = %local_addr,
            rpc_path = %self.config.rpc_path,
            metrics_path = %self.config.metrics_path,
            max_body_bytes = self.config.max_body_bytes,
            "JSON-RPC server listening"
        );

        let routes = Arc::new(Routes {
            front_door: self.front_door,
            rpc_path: self.config.rpc_path,
            metrics_path: self.config.metrics_path,
            max_body_bytes: self.config.max_body_bytes,
            metrics: self.metrics,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, routes, shutdown_rx));

        Ok(ServerHandle {
            local_addr,
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Running server; dropping the handle also stops accepting
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting; connections already accepted run to completion
    pub async fn stop(self) -> Result<(), ServerError> {
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| ServerError::Task(e.to_string()))
    }
}

async fn accept_loop(
    listener: TcpListener,
    routes: Arc<Routes>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(serve_connection(routes.clone(), stream, peer));
                }
                Err(e) => warn!(error = %e, "Failed to accept connection"),
            },
        }
    }
    info!("JSON-RPC server stopped accepting connections");
}

async fn serve_connection(routes: Arc<Routes>, stream: TcpStream, peer: SocketAddr) {
    let service = service_fn(move |request: Request<Incoming>| {
        let routes = routes.clone();
        async move { Ok::<_, Infallible>(routes.handle(request).await) }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        debug!(peer = %peer, error = %e, "Connection closed with error");
    }
}

impl Routes {
    async fn handle(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path();

        if path == self.metrics_path {
            if let Some(render) = &self.metrics {
                let reply = if parts.method == Method::GET {
                    HttpReply::text(StatusCode::OK, render()).with_header(
                        http::header::CONTENT_TYPE,
                        http::HeaderValue::from_static(METRICS_CONTENT_TYPE),
                    )
                } else {
                    HttpReply::text(StatusCode::METHOD_NOT_ALLOWED, "only GET method supported")
                };
                return into_response(reply);
            }
        }

        if path != self.rpc_path {
            return into_response(HttpReply::text(StatusCode::NOT_FOUND, "not found"));
        }

        // Content-Length known up front: reject before reading anything
        if body.size_hint().lower() > self.max_body_bytes as u64 {
            return into_response(self.body_too_large(body.size_hint().lower()));
        }

        let body = match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return into_response(self.body_too_large(self.max_body_bytes as u64 + 1));
            }
            Err(e) => {
                debug!(error = %e, "Failed to read request body");
                return into_response(HttpReply::text(
                    StatusCode::BAD_REQUEST,
                    "request body could not be read",
                ));
            }
        };

        let inbound =
            InboundRequest::new(parts.method, path.to_string(), body).with_headers(parts.headers);
        into_response(self.front_door.serve(inbound).await)
    }

    fn body_too_large(&self, size: u64) -> HttpReply {
        warn!(size, limit = self.max_body_bytes, "Request body too large");
        // unread body left on the wire: the connection cannot be reused
        HttpReply::text(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("request body exceeds {} bytes", self.max_body_bytes),
        )
        .with_header(
            http::header::CONNECTION,
            http::HeaderValue::from_static("close"),
        )
    }
}

fn into_response(reply: HttpReply) -> Response<Full<Bytes>> {
    let (status, headers, body) = reply.into_parts();
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
