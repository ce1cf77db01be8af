use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("batch of {size} items exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("worker pool is shut down")]
    PoolClosed,

    #[error("graceful shutdown did not finish within {grace:?}")]
    ShutdownTimeout { grace: Duration },

    #[error("server task failed: {0}")]
    Server(String),
}
