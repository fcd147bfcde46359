//! HTTP status server
//!
//! Answers load balancer probes from the latest verdicts. Requests never touch
//! the database, so a probe is answered immediately no matter how long an
//! evaluation is taking.

use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::health::HealthState;

pub const AGG_CHECK_PATH: &str = "/agg_check";
pub const MA_CHECK_PATH: &str = "/ma_check";

/// Build the response for a request against the current verdicts
pub fn route(
    state: &HealthState,
    role_check_enabled: bool,
    method: &Method,
    path: &str,
) -> Response<Full<Bytes>> {
    if *method != Method::GET {
        return text(StatusCode::NOT_IMPLEMENTED, "Not Implemented\n".to_string());
    }

    match path {
        AGG_CHECK_PATH => {
            let health = state.health();
            if health.healthy {
                text(StatusCode::OK, "OK - Aggregator Healthy\n".to_string())
            } else {
                unavailable(&health.last_error)
            }
        }
        MA_CHECK_PATH if role_check_enabled => {
            let health = state.health();
            let role = state.role();
            if health.healthy && role.is_master {
                text(StatusCode::OK, "OK - Master Aggregator\n".to_string())
            } else {
                unavailable(&role.last_error)
            }
        }
        _ => text(StatusCode::NOT_FOUND, "Not Found\n".to_string()),
    }
}

fn unavailable(cause: &str) -> Response<Full<Bytes>> {
    text(
        StatusCode::SERVICE_UNAVAILABLE,
        format!("Unavailable - {}\n", cause),
    )
}

fn text(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Status endpoint listener
pub struct StatusServer {
    state: Arc<HealthState>,
    role_check_enabled: bool,
}

impl StatusServer {
    pub fn new(state: Arc<HealthState>, role_check_enabled: bool) -> Self {
        Self {
            state,
            role_check_enabled,
        }
    }

    /// Bind `addr` and serve until `shutdown` fires
    pub async fn run(self, addr: &str, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %addr, "Status server listening");
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        let server = Arc::new(self);

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Status server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(v) => v,
                    Err(e) => {
                        debug!(error = %e, "Failed to accept status connection");
                        continue;
                    }
                },
            };

            let io = TokioIo::new(stream);
            let server = server.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let server = server.clone();
                    async move {
                        Ok::<_, Infallible>(route(
                            &server.state,
                            server.role_check_enabled,
                            req.method(),
                            req.uri().path(),
                        ))
                    }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(peer = %peer, error = %e, "Status connection error");
                }
            });
        }
    }
}
