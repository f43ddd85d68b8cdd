use super::{FrontEnd, StopHandle};
use crate::server::config::TlsConfig;
use crate::server::error::ServerError;
use crate::server::service::MiniBlogService;
use miniblog_core::proto::FILE_DESCRIPTOR_SET;
use miniblog_core::proto::mini_blog_server::MiniBlogServer;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tonic_reflection::server::Builder;

const NAME: &str = "rpc";

/// The gRPC listener: health, reflection and the `MiniBlog` service behind
/// the interceptor chain.
pub struct RpcFrontEnd {
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    service: MiniBlogService,
    tls: Option<TlsConfig>,
    stop: StopHandle,
}

impl RpcFrontEnd {
    pub async fn bind(
        addr: SocketAddr,
        service: MiniBlogService,
        tls: Option<TlsConfig>,
    ) -> Result<Self, ServerError> {
        let listen_err = |source| ServerError::Listen {
            name: NAME,
            addr,
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(listen_err)?;
        let local_addr = listener.local_addr().map_err(listen_err)?;
        tracing::info!(%local_addr, tls = tls.is_some(), "gRPC listener bound");

        Ok(Self {
            local_addr,
            listener: Mutex::new(Some(listener)),
            service,
            tls,
            stop: StopHandle::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }
}

#[tonic::async_trait]
impl FrontEnd for RpcFrontEnd {
    fn name(&self) -> &'static str {
        NAME
    }

    fn listeners(&self) -> Vec<(&'static str, SocketAddr)> {
        vec![(NAME, self.local_addr)]
    }

    async fn run(&self) -> Result<(), ServerError> {
        let _guard = self.stop.enter(NAME)?;
        if self.stop.is_stopping() {
            return Ok(());
        }
        let listener = self.listener.lock().take().ok_or_else(|| ServerError::Serve {
            name: NAME,
            reason: "listener already consumed".into(),
        })?;

        let (health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<MiniBlogServer<MiniBlogService>>()
            .await;

        let reflection = Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()
            .map_err(|e| ServerError::Serve {
                name: NAME,
                reason: format!("reflection service: {e}"),
            })?;

        let mut builder = Server::builder().http2_adaptive_window(Some(true));
        if let Some(tls) = &self.tls {
            builder = builder.tls_config(server_tls(tls).await?)?;
        }
        let router = builder
            .add_service(health_service)
            .add_service(reflection)
            .add_service(self.service.clone().into_server());

        let graceful = self.stop.graceful();
        let shutdown = async move {
            graceful.cancelled().await;
            // Health checks see NOT_SERVING while in-flight calls drain.
            health_reporter
                .set_not_serving::<MiniBlogServer<MiniBlogService>>()
                .await;
            tracing::info!("gRPC front-end draining");
        };

        let force = self.stop.force();
        tokio::select! {
            res = router.serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown) => {
                res?;
                tracing::info!("gRPC front-end stopped");
                Ok(())
            }
            () = force.cancelled() => {
                tracing::warn!("gRPC front-end force-closed");
                Ok(())
            }
        }
    }

    async fn graceful_stop(&self, deadline: Duration) -> Result<(), ServerError> {
        self.stop.stop(NAME, deadline).await
    }
}

pub(super) async fn read_pem(path: &Path) -> Result<Vec<u8>, ServerError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| ServerError::Tls(format!("reading {}: {e}", path.display())))
}

async fn server_tls(tls: &TlsConfig) -> Result<ServerTlsConfig, ServerError> {
    let cert = read_pem(&tls.cert_path).await?;
    let key = read_pem(&tls.key_path).await?;
    Ok(ServerTlsConfig::new().identity(Identity::from_pem(cert, key)))
}
