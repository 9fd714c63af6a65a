//! Graceful shutdown coordination
//!
//! One root cancellation token fans out to every long-lived task. Shutdown
//! cancels it, then waits a bounded grace period for tracked tasks to finish.

use log::{info, warn};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Graceful shutdown coordinator
#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
    grace: Duration,
}

impl ShutdownCoordinator {
    /// Create a coordinator that waits up to `grace` for tasks on shutdown
    pub fn new(grace: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            grace,
        }
    }

    /// Root token; cancelled when shutdown starts
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Token cancelled with the root, cancellable on its own
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Check if shutdown is in progress
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Tracked tasks that have not finished
    pub fn active_task_count(&self) -> usize {
        self.tracker.len()
    }

    /// Spawn a task that shutdown will wait for
    pub fn spawn<F>(&self, name: &'static str, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        log::debug!("Starting task {}", name);
        self.tracker.spawn(task)
    }

    /// Resolves once shutdown has started
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Cancel everything and wait up to the grace period for tracked tasks
    pub async fn shutdown(&self) -> Result<(), ShutdownError> {
        if self.token.is_cancelled() && self.tracker.is_closed() {
            return Err(ShutdownError::AlreadyShuttingDown);
        }

        info!(
            "Starting graceful shutdown, waiting up to {:?} for {} tasks",
            self.grace,
            self.tracker.len()
        );
        self.token.cancel();
        self.tracker.close();

        if tokio::time::timeout(self.grace, self.tracker.wait()).await.is_ok() {
            info!("Graceful shutdown completed");
            Ok(())
        } else {
            let remaining = self.tracker.len();
            warn!("Shutdown grace elapsed with {} tasks still active", remaining);
            Err(ShutdownError::TasksRemaining(remaining))
        }
    }
}

/// Shutdown error types
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// Shutdown already in progress
    #[error("Shutdown already in progress")]
    AlreadyShuttingDown,

    /// Tasks still running when the grace period ran out
    #[error("Shutdown grace elapsed with {0} tasks still active")]
    TasksRemaining(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_cooperative_tasks() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let token = coordinator.child_token();

        coordinator.spawn("worker", async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_secs(1)).await;
        });
        assert_eq!(coordinator.active_task_count(), 1);
        assert!(!coordinator.is_shutting_down());

        coordinator.shutdown().await.unwrap();
        assert!(coordinator.is_shutting_down());
        assert_eq!(coordinator.active_task_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_gives_up_after_grace() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(2));

        coordinator.spawn("stuck", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let started = tokio::time::Instant::now();
        let result = coordinator.shutdown().await;

        assert!(matches!(result, Err(ShutdownError::TasksRemaining(1))));
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_double_shutdown_prevented() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(100));

        coordinator.shutdown().await.unwrap();
        assert!(matches!(
            coordinator.shutdown().await,
            Err(ShutdownError::AlreadyShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_child_tokens_follow_root() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(100));
        let child = coordinator.child_token();

        child.cancel();
        assert!(!coordinator.is_shutting_down());

        let other = coordinator.child_token();
        coordinator.shutdown().await.unwrap();
        assert!(other.is_cancelled());
    }
}
