pub mod config;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod supervisor;

pub use config::EngineConfig;
pub use coordinator::{Coordinator, Outcome};
pub use error::EngineError;
pub use lifecycle::{Lifecycle, ShutdownState};
pub use pool::WorkerPool;
pub use supervisor::ShutdownSupervisor;
