use std::sync::Arc;

use tokio::sync::mpsc;

use sync_api::Transformer;

use crate::error::EngineError;
use crate::pool::{Job, WorkerPool};

/// Result of one item: either the transformed value or why it has none.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Processed(T),
    Fault { key: String, reason: String },
}

impl<T> Outcome<T> {
    pub fn is_fault(&self) -> bool {
        matches!(self, Outcome::Fault { .. })
    }

    pub fn processed(self) -> Option<T> {
        match self {
            Outcome::Processed(item) => Some(item),
            Outcome::Fault { .. } => None,
        }
    }
}

/// Fans a batch out over the worker pool and collects every result.
pub struct Coordinator<T: Transformer> {
    pool: Arc<WorkerPool<T>>,
}

impl<T: Transformer> Clone for Coordinator<T> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<T: Transformer> Coordinator<T> {
    pub fn new(pool: Arc<WorkerPool<T>>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<WorkerPool<T>> {
        &self.pool
    }

    /// Transform every item of `batch` and return one outcome per item.
    ///
    /// Outcomes arrive in completion order, not submission order. The call
    /// returns only once every submitted job has replied or been discarded by
    /// a cancelled pool; discarded items come back as faults.
    pub async fn process(&self, batch: Vec<T::Item>) -> Result<Vec<Outcome<T::Item>>, EngineError> {
        let size = batch.len();
        if size == 0 {
            return Ok(Vec::new());
        }
        let max = self.pool.max_batch_size();
        if size > max {
            return Err(EngineError::BatchTooLarge { size, max });
        }
        if self.pool.is_closed() {
            return Err(EngineError::PoolClosed);
        }

        let transformer = self.pool.transformer();
        tracing::info!(transformer = transformer.name(), size, "processing batch");

        let keys: Vec<String> = batch.iter().map(|item| transformer.key(item)).collect();

        // Every job holds a clone of `reply_tx`; the channel closes once the
        // last job has replied or been dropped.
        let (reply_tx, mut reply_rx) = mpsc::channel(size);
        for (position, item) in batch.into_iter().enumerate() {
            let job = Job {
                position,
                key: keys[position].clone(),
                item,
                reply: reply_tx.clone(),
            };
            if self.pool.submit(job).await.is_err() {
                tracing::warn!(position, size, "worker pool closed mid-batch");
                break;
            }
        }
        drop(reply_tx);

        let mut seen = vec![false; size];
        let mut outcomes = Vec::with_capacity(size);
        while let Some((position, outcome)) = reply_rx.recv().await {
            seen[position] = true;
            outcomes.push(outcome);
        }

        for (position, done) in seen.into_iter().enumerate() {
            if !done {
                outcomes.push(Outcome::Fault {
                    key: keys[position].clone(),
                    reason: "cancelled before processing".to_string(),
                });
            }
        }

        let faults = outcomes.iter().filter(|o| o.is_fault()).count();
        tracing::info!(
            transformer = transformer.name(),
            size,
            processed = size - faults,
            faults,
            "batch complete"
        );
        Ok(outcomes)
    }
}
