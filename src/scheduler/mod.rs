//! Paced FIFO scheduler for outbound store requests
//!
//! The pinning service enforces a global per-account burst limit that is
//! independent of which credential a request presents, so pacing has to be
//! global too. A single dispatcher task owns the queue: work items execute
//! strictly in enqueue order, one at a time, and item k+1 never starts
//! until at least the minimum interval has elapsed since item k started.
//!
//! One item failing (or panicking) never stalls the queue; the failure is
//! delivered to that item's caller and the dispatcher moves on.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::{Result, StorygateError};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

const QUEUE_DEPTH: usize = 256;

/// Serialized dispatcher enforcing minimum spacing between request starts.
pub struct RequestScheduler {
    queue_tx: mpsc::Sender<Job>,
    min_interval: Duration,
}

impl RequestScheduler {
    /// Create the scheduler and spawn its dispatcher task.
    pub fn new(min_interval: Duration) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel::<Job>(QUEUE_DEPTH);

        tokio::spawn(dispatch_loop(queue_rx, min_interval));

        Self {
            queue_tx,
            min_interval,
        }
    }

    /// Minimum spacing between two dispatched request starts.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Queue `work` for paced execution and wait for its output.
    ///
    /// Items run strictly in enqueue order. If `work` panics the caller
    /// receives an error and subsequent items still run.
    pub async fn enqueue<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();

        let job: Job = Box::pin(async move {
            let output = work.await;
            // The caller may have gone away; that is not the queue's problem.
            let _ = result_tx.send(output);
        });

        self.queue_tx
            .send(job)
            .await
            .map_err(|_| StorygateError::Internal("request scheduler is shut down".to_string()))?;

        result_rx
            .await
            .map_err(|_| StorygateError::Internal("scheduled request was dropped".to_string()))
    }
}

/// Dispatcher task: owns the last-start bookkeeping, no shared state.
async fn dispatch_loop(mut queue_rx: mpsc::Receiver<Job>, min_interval: Duration) {
    let mut last_started: Option<Instant> = None;

    while let Some(job) = queue_rx.recv().await {
        if let Some(started) = last_started {
            tokio::time::sleep_until(started + min_interval).await;
        }
        last_started = Some(Instant::now());

        if std::panic::AssertUnwindSafe(job)
            .catch_unwind()
            .await
            .is_err()
        {
            warn!("Scheduled request panicked; continuing with next item");
        }
    }

    debug!("Request scheduler dispatcher stopped");
}
