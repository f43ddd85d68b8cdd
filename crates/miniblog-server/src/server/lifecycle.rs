//! Process lifecycle: `Idle -> Running -> ShuttingDown -> Stopped`.
//!
//! The [`Coordinator`] launches the front-end on its own task and then waits
//! on a [`CancellationToken`] that the signal listener (or a test) cancels.
//! Shutdown always completes: a front-end that does not drain within the
//! deadline is force-closed, the timeout is logged, and the coordinator still
//! reaches `Stopped` within the deadline plus [`SHUTDOWN_MARGIN`].

use crate::server::error::ServerError;
use crate::server::frontend::FrontEnd;
use core::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Extra time granted after the shutdown deadline for force-closed tasks to
/// unwind.
pub const SHUTDOWN_MARGIN: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Stopped => "stopped",
        })
    }
}

pub struct Coordinator {
    deadline: Duration,
    state: watch::Sender<LifecycleState>,
    shutdown: CancellationToken,
}

impl Coordinator {
    pub fn new(deadline: Duration) -> Self {
        Self {
            deadline,
            state: watch::Sender::new(LifecycleState::Idle),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Cancelling this token starts the shutdown. Cancelling it again is a
    /// no-op.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Runs `frontend` until shutdown is requested or it fails, then stops it
    /// gracefully. A front-end failure is returned once `Stopped` is reached;
    /// a shutdown timeout is only logged.
    pub async fn run(&self, frontend: Arc<dyn FrontEnd>) -> Result<(), ServerError> {
        let name = frontend.name();
        let mut task = tokio::spawn({
            let frontend = frontend.clone();
            async move { frontend.run().await }
        });
        self.transition(LifecycleState::Running);

        let failed = tokio::select! {
            () = self.shutdown.cancelled() => None,
            res = &mut task => Some(flatten(name, res)),
        };
        if let Some(Err(err)) = &failed {
            tracing::error!(name, error = %err, "front-end failed while running");
        }

        self.transition(LifecycleState::ShuttingDown);
        if let Err(err) = frontend.graceful_stop(self.deadline).await {
            tracing::warn!(name, error = %err, "graceful stop incomplete");
        }

        let outcome = match failed {
            Some(res) => res,
            None => match tokio::time::timeout(SHUTDOWN_MARGIN, &mut task).await {
                Ok(res) => flatten(name, res),
                Err(_) => {
                    tracing::warn!(name, "front-end task did not exit, aborting");
                    task.abort();
                    Ok(())
                }
            },
        };

        self.transition(LifecycleState::Stopped);
        outcome
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        tracing::info!(from = %previous, to = %next, "lifecycle transition");
    }
}

fn flatten(
    name: &'static str,
    res: Result<Result<(), ServerError>, tokio::task::JoinError>,
) -> Result<(), ServerError> {
    res.unwrap_or_else(|e| {
        Err(ServerError::Serve {
            name,
            reason: e.to_string(),
        })
    })
}

/// Cancels `token` on Ctrl+C or SIGTERM.
pub async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
        () = token.cancelled() => return,
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
    token.cancel();
}
