use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sync_api::Transformer;

use crate::config::EngineConfig;
use crate::coordinator::Outcome;
use crate::error::EngineError;

/// One item handed to the pool, plus the fan-in channel of its batch.
pub(crate) struct Job<I> {
    pub position: usize,
    pub key: String,
    pub item: I,
    pub reply: mpsc::Sender<(usize, Outcome<I>)>,
}

type SharedQueue<I> = Arc<tokio::sync::Mutex<mpsc::Receiver<Job<I>>>>;

/// Fixed set of worker tasks pulling from one bounded work queue.
///
/// The pool is shared by every request. Concurrent batches interleave in the
/// queue but never see each other's results: every job replies on the
/// channel of the batch that submitted it.
pub struct WorkerPool<T: Transformer> {
    transformer: Arc<T>,
    queue_tx: mpsc::Sender<Job<T::Item>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    workers: usize,
    max_batch_size: usize,
    submitted: AtomicU64,
}

impl<T: Transformer> std::fmt::Debug for WorkerPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("transformer", &self.transformer.name())
            .field("workers", &self.workers)
            .field("max_batch_size", &self.max_batch_size)
            .field("closed", &self.cancel.is_cancelled())
            .finish()
    }
}

impl<T: Transformer> WorkerPool<T> {
    /// Spawn `config.workers` worker tasks. Must be called inside a tokio runtime.
    ///
    /// Cancelling `cancel` stops workers from taking further jobs; a job that is
    /// already running still completes and delivers its result.
    pub fn start(transformer: Arc<T>, config: &EngineConfig, cancel: CancellationToken) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.max_batch_size);
        let queue: SharedQueue<T::Item> = Arc::new(tokio::sync::Mutex::new(queue_rx));

        let handles = (0..config.workers)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&transformer),
                    Arc::clone(&queue),
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::info!(
            transformer = transformer.name(),
            workers = config.workers,
            queue = config.max_batch_size,
            "worker pool started"
        );

        Self {
            transformer,
            queue_tx,
            handles: Mutex::new(handles),
            cancel,
            workers: config.workers,
            max_batch_size: config.max_batch_size,
            submitted: AtomicU64::new(0),
        }
    }

    pub fn transformer(&self) -> &Arc<T> {
        &self.transformer
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Total number of jobs ever accepted by the queue.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits for queue space. Fails once every worker has exited.
    pub(crate) async fn submit(&self, job: Job<T::Item>) -> Result<(), EngineError> {
        self.queue_tx
            .send(job)
            .await
            .map_err(|_| EngineError::PoolClosed)?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Cancel the workers and wait for them to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles = std::mem::take(
            &mut *self
                .handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for h in handles {
            if let Err(e) = h.await {
                tracing::error!(error = %e, "worker task failed");
            }
        }
        tracing::info!(transformer = self.transformer.name(), "worker pool stopped");
    }
}

async fn worker_loop<T: Transformer>(
    id: usize,
    transformer: Arc<T>,
    queue: SharedQueue<T::Item>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = next_job(&queue) => match job {
                Some(job) => job,
                None => break,
            },
        };

        let Job {
            position,
            key,
            item,
            reply,
        } = job;
        let outcome = run_transform(&transformer, key, item).await;
        // Fan-in channel is sized to the batch; this never waits.
        let _ = reply.send((position, outcome)).await;
    }
    tracing::debug!(worker = id, "worker stopped");
}

async fn next_job<I>(queue: &tokio::sync::Mutex<mpsc::Receiver<Job<I>>>) -> Option<Job<I>> {
    queue.lock().await.recv().await
}

/// Runs on the blocking pool so a slow transform cannot stall the runtime.
async fn run_transform<T: Transformer>(
    transformer: &Arc<T>,
    key: String,
    item: T::Item,
) -> Outcome<T::Item> {
    let t = Arc::clone(transformer);
    let reason = match tokio::task::spawn_blocking(move || t.transform(item)).await {
        Ok(Ok(item)) => return Outcome::Processed(item),
        Ok(Err(e)) => e.to_string(),
        Err(e) if e.is_panic() => panic_message(e.into_panic()),
        Err(e) => format!("task aborted: {e}"),
    };
    tracing::warn!(transformer = transformer.name(), key = %key, reason = %reason, "item faulted");
    Outcome::Fault { key, reason }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_api::AppendSuffix;

    fn config(workers: usize) -> EngineConfig {
        EngineConfig {
            workers,
            max_batch_size: 8,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn job_reply_carries_position() {
        let pool = WorkerPool::start(
            Arc::new(AppendSuffix::default()),
            &config(2),
            CancellationToken::new(),
        );
        let (tx, mut rx) = mpsc::channel(1);
        pool.submit(Job {
            position: 3,
            key: "x".into(),
            item: "x".to_string(),
            reply: tx,
        })
        .await
        .unwrap();

        let (position, outcome) = rx.recv().await.unwrap();
        assert_eq!(position, 3);
        assert_eq!(outcome, Outcome::Processed("x_processed".to_string()));
        assert_eq!(pool.submitted(), 1);
    }

    #[tokio::test]
    async fn submit_fails_after_shutdown() {
        let pool = WorkerPool::start(
            Arc::new(AppendSuffix::default()),
            &config(2),
            CancellationToken::new(),
        );
        pool.shutdown().await;
        assert!(pool.is_closed());

        let (tx, _rx) = mpsc::channel(1);
        let res = pool
            .submit(Job {
                position: 0,
                key: "a".into(),
                item: "a".to_string(),
                reply: tx,
            })
            .await;
        assert!(matches!(res, Err(EngineError::PoolClosed)));
        assert_eq!(pool.submitted(), 0);
    }

    #[test]
    fn panic_payloads_are_rendered() {
        assert_eq!(panic_message(Box::new("boom")), "panicked: boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "panicked: bang");
        assert_eq!(panic_message(Box::new(7u8)), "panicked");
    }
}
