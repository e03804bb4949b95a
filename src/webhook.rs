//! Webhook trigger receiver: `POST /trigger` wakes the scan loop via a
//! shared `tokio::sync::Notify`; `GET /health` reports liveness.
//!
//! Grounded in `original_source/webhook.py` (same two routes, same
//! response bodies) and the teacher's `main.rs` hyper server-loop
//! boilerplate, repurposed from serving WebDAV connections to serving
//! this much smaller surface.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info};

async fn handle(req: Request<Incoming>, scan_signal: Arc<Notify>) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let path = req.uri().path().trim_end_matches('/');
    let response = match (req.method(), path) {
        (&hyper::Method::POST, "/trigger") => {
            scan_signal.notify_one();
            info!("webhook: trigger received, waking scan loop");
            Response::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::from_static(b"{\"status\":\"triggered\"}\n")))
                .unwrap()
        }
        (&hyper::Method::GET, "/health") => Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from_static(b"{\"status\":\"ok\"}\n")))
            .unwrap(),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new()))
            .unwrap(),
    };
    Ok(response)
}

/// Runs the webhook server until the process exits. Meant to be
/// `tokio::spawn`ed alongside the scan orchestrator loop.
pub async fn run(port: u16, scan_signal: Arc<Notify>) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("webhook: listening on http://{addr}");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let scan_signal = scan_signal.clone();

        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .serve_connection(io, service_fn(move |req| handle(req, scan_signal.clone())))
                .await
            {
                if let Some(io_err) = err.source().and_then(|s| s.downcast_ref::<std::io::Error>()) {
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset || io_err.kind() == std::io::ErrorKind::BrokenPipe {
                        return;
                    }
                }
                error!("webhook: error serving connection: {err:?}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_notifies_waiter() {
        // `hyper::body::Incoming` has no public test constructor, so this
        // exercises the notify plumbing that `handle`'s /trigger arm relies
        // on rather than constructing a full request.
        let signal = Arc::new(Notify::new());
        let waiter = signal.clone();
        let notified = tokio::spawn(async move { waiter.notified().await });
        signal.notify_one();
        notified.await.unwrap();
    }
}
