//! Background worker lifecycle.

use log::{error, info};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One spawned background task plus the token used to stop it.
///
/// Cancellation is cooperative: the task body receives the token and is
/// expected to check it between ticks. [`Worker::stop`] cancels and then
/// waits for the task to exit.
pub struct Worker {
    name: String,
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl Worker {
    pub fn spawn<F, Fut>(name: impl Into<String>, task_fn: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let cancel_token = CancellationToken::new();
        let task_token = cancel_token.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Starting worker: {task_name}");
            task_fn(task_token).await;
            info!("Worker '{task_name}' exited");
        });

        Self {
            name,
            handle,
            cancel_token,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the task is still alive.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signals the task without waiting for it.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Signals the task and blocks until it has fully exited.
    pub async fn stop(self) {
        info!("Stopping worker '{}'", self.name);
        self.cancel_token.cancel();

        if let Err(e) = self.handle.await {
            error!("Worker '{}' panicked: {e}", self.name);
        }
    }
}

impl core::fmt::Debug for Worker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };
    use tokio::time::{Duration, sleep};

    #[tokio::test]
    async fn stop_cancels_and_joins() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = exited.clone();

        let worker = Worker::spawn("test", move |token| async move {
            token.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(worker.name(), "test");
        assert!(worker.is_running());

        worker.stop().await;
        assert!(exited.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn in_flight_work_completes_before_stop_returns() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = finished.clone();

        let worker = Worker::spawn("slow", move |token| async move {
            while !token.is_cancelled() {
                sleep(Duration::from_millis(30)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        sleep(Duration::from_millis(10)).await;
        worker.stop().await;

        let after_stop = finished.load(Ordering::SeqCst);
        assert!(after_stop >= 1);
        sleep(Duration::from_millis(60)).await;
        assert_eq!(finished.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn panicking_task_does_not_poison_stop() {
        let worker = Worker::spawn("boom", |_token| async move {
            panic!("worker failure");
        });
        sleep(Duration::from_millis(10)).await;
        assert!(!worker.is_running());
        worker.stop().await;
    }
}
