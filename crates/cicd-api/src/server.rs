//! Service host: owns the listener, optional TLS, and lifecycle.

use axum::Router;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use cicd_config::TlsKeyPair;
use std::future::Future;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

/// Service-fatal host errors.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("error loading TLS key pair: {0}")]
    Tls(#[source] std::io::Error),

    #[error("error starting webserver: {0}")]
    Serve(#[source] std::io::Error),

    #[error("error installing signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// HTTP(S) server for the build service.
pub struct ServiceHost {
    addr: SocketAddr,
    router: Router,
    tls: Option<TlsKeyPair>,
    handle: Handle,
}

impl ServiceHost {
    /// Create a host that will listen on `addr`.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            router: Router::new(),
            tls: None,
            handle: Handle::new(),
        }
    }

    /// Register additional endpoints.
    pub fn register_endpoints(mut self, router: Router) -> Self {
        self.router = self.router.merge(router);
        self
    }

    /// Serve exclusively over TLS with the given key pair.
    pub fn enable_tls(mut self, key_pair: TlsKeyPair) -> Self {
        info!("Enabling TLS");
        self.tls = Some(key_pair);
        self
    }

    /// Serve until SIGINT or SIGTERM arrives, or the listener fails.
    pub async fn start(&self) -> Result<(), HostError> {
        let mut sigint = signal(SignalKind::interrupt()).map_err(HostError::Signal)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(HostError::Signal)?;

        self.start_until(async move {
            tokio::select! {
                _ = sigint.recv() => info!(signal = "SIGINT", "Got shutdown signal"),
                _ = sigterm.recv() => info!(signal = "SIGTERM", "Got shutdown signal"),
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves, or the listener fails.
    ///
    /// On shutdown the listener stops accepting and in-flight responses are
    /// drained with no deadline.
    pub async fn start_until<F>(&self, shutdown: F) -> Result<(), HostError>
    where
        F: Future<Output = ()>,
    {
        let serve = self.serve();
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => result,
            () = shutdown => {
                self.stop();
                serve.await
            }
        }
    }

    /// Stop a running host. Safe to call repeatedly and from any task.
    pub fn stop(&self) {
        info!("Stopping Server...");
        self.handle.graceful_shutdown(None);
    }

    /// Address the listener is bound to, once it is listening; `None` if it
    /// failed to bind.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.handle.listening().await
    }

    async fn serve(&self) -> Result<(), HostError> {
        info!(addr = %self.addr, "Starting Server...");
        let app = self.router.clone().into_make_service();

        match &self.tls {
            Some(key_pair) => {
                let config = RustlsConfig::from_pem_file(&key_pair.cert_file, &key_pair.key_file)
                    .await
                    .map_err(HostError::Tls)?;
                axum_server::bind_rustls(self.addr, config)
                    .handle(self.handle.clone())
                    .serve(app)
                    .await
                    .map_err(HostError::Serve)
            }
            None => axum_server::bind(self.addr)
                .handle(self.handle.clone())
                .serve(app)
                .await
                .map_err(HostError::Serve),
        }
    }
}
