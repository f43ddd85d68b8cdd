use super::gateway::{self, GatewayFrontEnd};
use super::{CompositeFrontEnd, FrontEnd, HttpFrontEnd, RpcFrontEnd};
use crate::server::config::{ServerConfig, ServerMode};
use crate::server::error::ServerError;
use crate::server::union::Dependencies;
use miniblog_core::operations::SERVICE_NAME;
use miniblog_core::proto::mini_blog_client::MiniBlogClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tonic::transport::Channel;
use tonic_health::pb::HealthCheckRequest;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;

/// Interval between health checks of the gRPC listener.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Builds and binds the front-end for `config.mode`.
///
/// In `grpc-gateway` mode the gRPC listener is started here, and the gateway
/// is only bound once a health check reports `SERVING`, so the gateway never
/// accepts a request the gRPC side cannot take.
pub async fn select(
    config: &ServerConfig,
    deps: &Dependencies,
) -> Result<Arc<dyn FrontEnd>, ServerError> {
    tracing::info!(mode = %config.mode, "selecting front-end");
    match config.mode {
        ServerMode::Grpc => {
            let rpc = RpcFrontEnd::bind(config.grpc_addr, deps.service(), config.tls.clone()).await?;
            Ok(Arc::new(rpc))
        }
        ServerMode::GrpcGateway => {
            let rpc = Arc::new(
                RpcFrontEnd::bind(config.grpc_addr, deps.service(), config.tls.clone()).await?,
            );
            let mut rpc_task = tokio::spawn({
                let rpc = rpc.clone();
                async move { rpc.run().await }
            });

            let channel = match gateway::dial(rpc.local_addr(), rpc.tls()).await {
                Ok(channel) => channel,
                Err(err) => {
                    rpc_task.abort();
                    return Err(err);
                }
            };

            let ready = await_ready(
                channel.clone(),
                config.rpc_ready_timeout,
                rpc.name(),
                &mut rpc_task,
            )
            .await;
            if let Err(err) = ready {
                rpc_task.abort();
                return Err(err);
            }
            tracing::info!(addr = %rpc.local_addr(), "gRPC front-end ready");

            let client = MiniBlogClient::new(channel);
            let gateway = match GatewayFrontEnd::bind(config.http_addr, client, config.tls.clone()).await {
                Ok(gateway) => gateway,
                Err(err) => {
                    rpc_task.abort();
                    return Err(err);
                }
            };
            Ok(Arc::new(CompositeFrontEnd::new(gateway, rpc, rpc_task)))
        }
        ServerMode::Http => {
            let http = HttpFrontEnd::bind(config.http_addr, deps, config.tls.clone()).await?;
            Ok(Arc::new(http))
        }
    }
}

/// Waits for [`wait_ready`] unless the gRPC task exits first, in which case
/// its error (or the fact that it stopped) is the failure.
async fn await_ready(
    channel: Channel,
    bound: Duration,
    name: &'static str,
    rpc_task: &mut JoinHandle<Result<(), ServerError>>,
) -> Result<(), ServerError> {
    tokio::select! {
        ready = wait_ready(channel, bound) => ready,
        res = rpc_task => Err(match res {
            Ok(Err(err)) => err,
            Ok(Ok(())) => ServerError::Serve {
                name,
                reason: "exited before ready".into(),
            },
            Err(join) => ServerError::Serve {
                name,
                reason: join.to_string(),
            },
        }),
    }
}

/// Polls the gRPC health service until `MiniBlog` reports `SERVING`.
pub async fn wait_ready(channel: Channel, bound: Duration) -> Result<(), ServerError> {
    let mut health = HealthClient::new(channel);
    let poll = async {
        loop {
            let request = HealthCheckRequest {
                service: SERVICE_NAME.into(),
            };
            match health.check(request).await {
                Ok(response) if response.get_ref().status() == ServingStatus::Serving => return,
                Ok(response) => {
                    tracing::debug!(status = ?response.get_ref().status(), "gRPC front-end not serving yet");
                }
                Err(status) => tracing::debug!(%status, "health check failed"),
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    };
    tokio::time::timeout(bound, poll)
        .await
        .map_err(|_| ServerError::NotReady(bound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_stream::wrappers::TcpListenerStream;
    use tonic::transport::{Endpoint, Server};
    use tonic_health::server::HealthReporter;

    const BOUND: Duration = Duration::from_millis(300);

    /// A bare health service on a loopback port.
    async fn health_server() -> (HealthReporter, Channel) {
        let (reporter, service) = tonic_health::server::health_reporter();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(
            Server::builder()
                .add_service(service)
                .serve_with_incoming(TcpListenerStream::new(listener)),
        );
        let channel = Endpoint::from_shared(format!("http://{addr}"))
            .unwrap()
            .connect_lazy();
        (reporter, channel)
    }

    #[tokio::test]
    async fn not_serving_times_out_as_not_ready() {
        let (reporter, channel) = health_server().await;
        reporter
            .set_service_status(SERVICE_NAME, tonic_health::ServingStatus::NotServing)
            .await;

        let started = std::time::Instant::now();
        let err = wait_ready(channel, BOUND).await.unwrap_err();
        assert!(matches!(err, ServerError::NotReady(bound) if bound == BOUND));
        assert!(started.elapsed() >= BOUND);
    }

    #[tokio::test]
    async fn unregistered_service_is_not_ready() {
        let (_reporter, channel) = health_server().await;
        let err = wait_ready(channel, BOUND).await.unwrap_err();
        assert!(matches!(err, ServerError::NotReady(_)));
    }

    #[tokio::test]
    async fn becomes_ready_once_serving() {
        let (reporter, channel) = health_server().await;
        reporter
            .set_service_status(SERVICE_NAME, tonic_health::ServingStatus::NotServing)
            .await;
        tokio::spawn(async move {
            tokio::time::sleep(READY_POLL_INTERVAL * 2).await;
            reporter
                .set_service_status(SERVICE_NAME, tonic_health::ServingStatus::Serving)
                .await;
        });

        wait_ready(channel, Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn rpc_exit_before_ready_is_reported() {
        let (_reporter, channel) = health_server().await;

        let mut failed = tokio::spawn(async {
            Err(ServerError::Serve {
                name: "rpc",
                reason: "boom".into(),
            })
        });
        let err = await_ready(channel.clone(), Duration::from_secs(5), "rpc", &mut failed)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Serve { reason, .. } if reason == "boom"));

        let mut stopped = tokio::spawn(async { Ok(()) });
        let err = await_ready(channel, Duration::from_secs(5), "rpc", &mut stopped)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Serve { reason, .. } if reason == "exited before ready"));
    }
}
