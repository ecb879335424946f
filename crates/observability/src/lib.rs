//! Logging setup, a minimal health endpoint, and a cooperative-shutdown
//! helper shared by every stage binary — the ambient stack every stage
//! entrypoint wires up before anything domain-specific runs, following the
//! teacher's `bin/server.rs` initialization order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

/// Initializes a pretty stdout subscriber filtered by `RUST_LOG`
/// (defaulting to `info`), matching `rustrade::bin::server`'s setup.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Serves a fixed `200 OK` body on `port` until `shutdown` is requested.
/// Stands in for the FastAPI `/health` handler in the original system —
/// full HTTP serving is out of scope, so this is a bare socket loop rather
/// than a framework dependency.
pub async fn serve_health(port: u16, shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "health endpoint listening");
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }
        tokio::select! {
            accepted = listener.accept() => {
                let (mut socket, _) = accepted?;
                tokio::spawn(async move {
                    let body = b"{\"status\":\"ok\"}";
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
                        body.len()
                    );
                    if socket.write_all(response.as_bytes()).await.is_ok() {
                        let _ = socket.write_all(body).await;
                    }
                });
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => {}
        }
    }
}

/// A flag checked each ingestion-loop iteration plus a ctrl-c listener that
/// flips it, mirroring the cooperative-shutdown contract every stage's
/// ingestion task and stream worker must honor.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn flag(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Waits for ctrl-c then flips the flag, exactly as `bin/server.rs` does
    /// with `tokio::signal::ctrl_c().await`.
    pub async fn wait_for_ctrl_c(&self) {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("failed to install ctrl-c handler");
        }
        info!("shutdown signal received");
        self.request();
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_handle_starts_unrequested() {
        let handle = ShutdownHandle::new();
        assert!(!handle.is_requested());
        handle.request();
        assert!(handle.is_requested());
    }
}
