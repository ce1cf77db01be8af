use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("bind api {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] sync_engine::EngineError),
}
