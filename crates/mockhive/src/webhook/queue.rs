//! Bounded job queue between the request path and the dispatch loop.

use super::WebhookJob;
use tokio::sync::mpsc;

/// Default queue capacity. Enqueueing past this blocks the caller until
/// the dispatch loop frees a slot.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, thiserror::Error)]
#[error("webhook dispatch queue is closed")]
pub struct EnqueueError;

/// Cloneable enqueue handle. Order is preserved for dequeue, not for job
/// completion (jobs are detached once dequeued).
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<WebhookJob>,
}

impl DispatchQueue {
    /// Create a queue and its worker with the default capacity.
    pub fn new() -> (Self, super::DispatchWorker) {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Capacity-injectable constructor; tests use small capacities to
    /// exercise backpressure.
    pub fn with_capacity(capacity: usize) -> (Self, super::DispatchWorker) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, super::DispatchWorker::new(rx))
    }

    /// Enqueue a job, waiting for a free slot when the queue is full.
    pub async fn enqueue(&self, job: WebhookJob) -> Result<(), EnqueueError> {
        self.tx.send(job).await.map_err(|_| EnqueueError)
    }
}
