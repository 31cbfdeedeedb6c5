//! ABOUTME: Thin dashboard HTTP surface: deeplink auth, agent control, logs/history/stats
//! ABOUTME: Deliberately minimal per spec — a trait boundary plus a bare hyper listener, no framework

pub mod api;
pub mod auth;
pub mod router;
pub mod state;

pub use api::{ApiError, ApiResult, DashboardApi, LogLine};
pub use auth::AuthRegistry;
pub use state::AppState;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Runs the dashboard listener until `shutdown` resolves. Each accepted
/// connection gets its own task; in-flight connections are not forcibly
/// closed on shutdown, matching the bounded-drain approach the process
/// entrypoint uses everywhere else.
pub async fn serve(
    addr: SocketAddr,
    api: Arc<dyn DashboardApi>,
    auth: Arc<AuthRegistry>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "dashboard http listener started");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let io = TokioIo::new(stream);
                let api = Arc::clone(&api);
                let auth = Arc::clone(&auth);
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let api = Arc::clone(&api);
                        let auth = Arc::clone(&auth);
                        async move { Ok::<_, std::convert::Infallible>(router::dispatch(api, auth, req).await) }
                    });
                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        warn!(error = %err, "dashboard http connection error");
                    }
                });
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("dashboard http listener shutting down");
                    return Ok(());
                }
            }
        }
    }
}
