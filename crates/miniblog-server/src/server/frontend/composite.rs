use super::{FrontEnd, GatewayFrontEnd, RpcFrontEnd};
use crate::server::error::ServerError;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};

const NAME: &str = "grpc-gateway";

/// The gateway plus the gRPC listener it forwards to.
///
/// The gRPC listener is already running on its own task when this is built.
/// `run` drives the gateway and surfaces an early gRPC exit as an error;
/// `graceful_stop` stops the gateway first so no forwarded call is cut off,
/// then the gRPC listener with whatever is left of the deadline.
pub struct CompositeFrontEnd {
    gateway: GatewayFrontEnd,
    rpc: Arc<RpcFrontEnd>,
    rpc_task: Mutex<Option<JoinHandle<Result<(), ServerError>>>>,
    stopping: AtomicBool,
}

impl CompositeFrontEnd {
    pub fn new(
        gateway: GatewayFrontEnd,
        rpc: Arc<RpcFrontEnd>,
        rpc_task: JoinHandle<Result<(), ServerError>>,
    ) -> Self {
        Self {
            gateway,
            rpc,
            rpc_task: Mutex::new(Some(rpc_task)),
            stopping: AtomicBool::new(false),
        }
    }
}

#[tonic::async_trait]
impl FrontEnd for CompositeFrontEnd {
    fn name(&self) -> &'static str {
        NAME
    }

    fn listeners(&self) -> Vec<(&'static str, SocketAddr)> {
        let mut listeners = self.gateway.listeners();
        listeners.extend(self.rpc.listeners());
        listeners
    }

    async fn run(&self) -> Result<(), ServerError> {
        let mut rpc_task = self.rpc_task.lock().take().ok_or_else(|| ServerError::Serve {
            name: NAME,
            reason: "already running".into(),
        })?;

        tokio::select! {
            res = self.gateway.run() => {
                res?;
                // The gateway only returns Ok once stopping; the gRPC task
                // follows as soon as graceful_stop reaches it.
                joined(self.rpc.name(), rpc_task.await)
            }
            res = &mut rpc_task => {
                let res = joined(self.rpc.name(), res);
                if self.stopping.load(Ordering::SeqCst) {
                    return res;
                }
                tracing::error!("gRPC front-end exited while the gateway was serving");
                res.and(Err(ServerError::Serve {
                    name: self.rpc.name(),
                    reason: "exited unexpectedly".into(),
                }))
            }
        }
    }

    async fn graceful_stop(&self, deadline: Duration) -> Result<(), ServerError> {
        self.stopping.store(true, Ordering::SeqCst);
        let started = Instant::now();

        let gateway = self.gateway.graceful_stop(deadline).await;
        let remaining = deadline.saturating_sub(started.elapsed());
        let rpc = self.rpc.graceful_stop(remaining).await;

        // An RPC task that was never driven by `run` is still owned here.
        if let Some(task) = self.rpc_task.lock().take() {
            task.abort();
        }
        gateway.and(rpc)
    }
}

fn joined(
    name: &'static str,
    res: Result<Result<(), ServerError>, JoinError>,
) -> Result<(), ServerError> {
    res.unwrap_or_else(|e| {
        Err(ServerError::Serve {
            name,
            reason: e.to_string(),
        })
    })
}
