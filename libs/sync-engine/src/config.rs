use std::time::Duration;

use crate::error::EngineError;

/// Sizing and shutdown parameters for the batch engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of long-lived worker tasks in the pool.
    pub workers: usize,

    /// Largest batch a single request may submit. Also the work queue capacity.
    pub max_batch_size: usize,

    /// How long in-flight requests may drain after a termination signal.
    pub grace_period: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_batch_size: 1024,
            grace_period: Duration::from_secs(5),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.workers == 0 {
            return Err(EngineError::Config("workers must be at least 1".into()));
        }
        if self.max_batch_size == 0 {
            return Err(EngineError::Config(
                "max_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
