use super::StopHandle;
use crate::server::config::TlsConfig;
use crate::server::error::ServerError;
use axum::Router;
use axum_server::Handle;
use axum_server::tls_rustls::{RustlsConfig, from_tcp_rustls};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

/// A bound HTTP listener that serves an axum [`Router`] until stopped.
///
/// Plain listeners use `axum::serve` with graceful shutdown; TLS listeners
/// go through `axum_server` so the rustls acceptor sits in front of the
/// router.
pub struct RestListener {
    name: &'static str,
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    tls: Option<TlsConfig>,
    stop: StopHandle,
}

impl RestListener {
    pub async fn bind(
        name: &'static str,
        addr: SocketAddr,
        tls: Option<TlsConfig>,
    ) -> Result<Self, ServerError> {
        let listen_err = |source| ServerError::Listen { name, addr, source };
        let listener = TcpListener::bind(addr).await.map_err(listen_err)?;
        let local_addr = listener.local_addr().map_err(listen_err)?;
        tracing::info!(name, %local_addr, tls = tls.is_some(), "HTTP listener bound");

        Ok(Self {
            name,
            local_addr,
            listener: Mutex::new(Some(listener)),
            tls,
            stop: StopHandle::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn serve(&self, router: Router) -> Result<(), ServerError> {
        let name = self.name;
        let _guard = self.stop.enter(name)?;
        if self.stop.is_stopping() {
            return Ok(());
        }
        let listener = self.listener.lock().take().ok_or_else(|| ServerError::Serve {
            name,
            reason: "listener already consumed".into(),
        })?;

        match &self.tls {
            Some(tls) => self.serve_tls(listener, router, tls).await,
            None => self.serve_plain(listener, router).await,
        }
    }

    pub async fn stop(&self, deadline: Duration) -> Result<(), ServerError> {
        self.stop.stop(self.name, deadline).await
    }

    async fn serve_plain(&self, listener: TcpListener, router: Router) -> Result<(), ServerError> {
        let name = self.name;
        let graceful = self.stop.graceful();
        let force = self.stop.force();
        tracing::info!(name, addr = %self.local_addr, "serving HTTP");

        let server = axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move { graceful.cancelled().await })
            .into_future();

        tokio::select! {
            res = server => res.map_err(|e| ServerError::Serve { name, reason: e.to_string() }),
            () = force.cancelled() => {
                tracing::warn!(name, "HTTP front-end force-closed");
                Ok(())
            }
        }
    }

    async fn serve_tls(
        &self,
        listener: TcpListener,
        router: Router,
        tls: &TlsConfig,
    ) -> Result<(), ServerError> {
        let name = self.name;
        // axum-server is built without a provider; an earlier install wins.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
            .await
            .map_err(|e| ServerError::Tls(format!("loading certificates: {e}")))?;
        let std_listener = listener.into_std().map_err(|source| ServerError::Listen {
            name,
            addr: self.local_addr,
            source,
        })?;

        let handle = Handle::new();
        let shutdown_handle = handle.clone();
        let graceful = self.stop.graceful();
        let force = self.stop.force();
        // Translate the stop tokens into axum-server handle calls.
        let watcher = tokio::spawn(async move {
            graceful.cancelled().await;
            shutdown_handle.graceful_shutdown(None);
            force.cancelled().await;
            shutdown_handle.shutdown();
        });

        tracing::info!(name, addr = %self.local_addr, "serving HTTPS");
        let res = from_tcp_rustls(std_listener, rustls_config)
            .handle(handle)
            .serve(router.into_make_service())
            .await;
        watcher.abort();
        res.map_err(|e| ServerError::Serve {
            name,
            reason: e.to_string(),
        })
    }
}
