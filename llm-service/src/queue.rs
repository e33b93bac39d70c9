//! Process-wide serialized task queue.
//!
//! Exactly one structured-generation call may be in flight at any time. All
//! submissions funnel through a bounded channel consumed by a single worker
//! task; each submission resolves through its own oneshot handle, so a
//! failing task never blocks subsequent tasks.

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::errors::LlmError;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Single-worker serialized queue. Cheap to clone; all clones share the
/// same worker.
#[derive(Clone)]
pub struct SerialQueue {
    tx: mpsc::Sender<Job>,
}

impl SerialQueue {
    /// Spawns the consumer task and returns the queue handle.
    pub fn new(capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job().await;
            }
            debug!("serial queue worker stopped");
        });
        SerialQueue { tx }
    }

    /// Runs `fut` once every previously submitted task has settled.
    ///
    /// The returned future resolves with the task's output. If the worker is
    /// gone (shutdown), resolves with [`LlmError::QueueClosed`].
    pub async fn run<T, F>(&self, fut: F) -> Result<T, LlmError>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel::<T>();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                // The receiver may have been dropped; the queue keeps going.
                let _ = done_tx.send(fut.await);
            })
        });

        self.tx.send(job).await.map_err(|_| LlmError::QueueClosed)?;
        done_rx.await.map_err(|_| LlmError::QueueClosed)
    }
}
