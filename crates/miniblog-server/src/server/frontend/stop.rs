use crate::server::error::ServerError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Coordinates a serving loop with its graceful stop.
///
/// `graceful` asks the loop to stop accepting and drain, `force` tells it to
/// abandon whatever is still in flight, and `done` fires once the loop has
/// returned.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    graceful: CancellationToken,
    force: CancellationToken,
    done: CancellationToken,
    started: AtomicBool,
}

/// Held by a running loop. Dropping it marks the loop as done.
#[must_use = "the loop counts as done as soon as the guard is dropped"]
pub struct RunGuard {
    done: CancellationToken,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.done.cancel();
    }
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the loop as started. Fails if it already was.
    pub fn enter(&self, name: &'static str) -> Result<RunGuard, ServerError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(ServerError::Serve {
                name,
                reason: "already running".into(),
            });
        }
        Ok(RunGuard {
            done: self.inner.done.clone(),
        })
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.graceful.is_cancelled()
    }

    pub fn graceful(&self) -> CancellationToken {
        self.inner.graceful.clone()
    }

    pub fn force(&self) -> CancellationToken {
        self.inner.force.clone()
    }

    /// Requests a graceful stop and waits up to `deadline` for the loop to
    /// return. On timeout the loop is force-closed and `ShutdownTimeout` is
    /// returned.
    pub async fn stop(&self, name: &'static str, deadline: Duration) -> Result<(), ServerError> {
        self.inner.graceful.cancel();
        if !self.inner.started.load(Ordering::SeqCst) {
            self.inner.done.cancel();
            return Ok(());
        }

        if tokio::time::timeout(deadline, self.inner.done.cancelled())
            .await
            .is_ok()
        {
            tracing::debug!(name, "front-end drained");
            return Ok(());
        }

        self.inner.force.cancel();
        Err(ServerError::ShutdownTimeout { name, deadline })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn serve(handle: StopHandle, drain: Duration) -> Result<(), ServerError> {
        let _guard = handle.enter("test")?;
        if handle.is_stopping() {
            return Ok(());
        }
        handle.graceful().cancelled().await;
        let force = handle.force();
        tokio::select! {
            () = tokio::time::sleep(drain) => {}
            () = force.cancelled() => {}
        }
        Ok(())
    }

    #[tokio::test]
    async fn stop_before_start_is_immediate() {
        let handle = StopHandle::new();
        handle.stop("test", Duration::ZERO).await.unwrap();
        assert!(handle.is_stopping());
        // a loop started afterwards returns right away
        serve(handle, Duration::from_secs(60)).await.unwrap();
    }

    #[tokio::test]
    async fn stop_waits_for_the_loop_to_drain() {
        let handle = StopHandle::new();
        let task = tokio::spawn(serve(handle.clone(), Duration::from_millis(50)));
        while !handle.inner.started.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        handle.stop("test", Duration::from_secs(5)).await.unwrap();
        assert!(handle.inner.done.is_cancelled());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stop_past_deadline_forces_and_reports_timeout() {
        let handle = StopHandle::new();
        let task = tokio::spawn(serve(handle.clone(), Duration::from_secs(60)));
        while !handle.inner.started.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        let err = handle
            .stop("test", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::ShutdownTimeout { name: "test", .. }));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let handle = StopHandle::new();
        let task = tokio::spawn(serve(handle.clone(), Duration::ZERO));
        while !handle.inner.started.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        handle.stop("test", Duration::from_secs(5)).await.unwrap();
        handle.stop("test", Duration::from_secs(5)).await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[test]
    fn second_enter_is_rejected() {
        let handle = StopHandle::new();
        let _guard = handle.enter("test").unwrap();
        assert!(handle.enter("test").is_err());
    }
}
