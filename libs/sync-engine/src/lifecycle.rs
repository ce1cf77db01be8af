use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Process-wide service state. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Stopped,
}

impl ShutdownState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownState::Running => "running",
            ShutdownState::ShuttingDown => "shutting_down",
            ShutdownState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared handle to the [`ShutdownState`]. Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<ShutdownState>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        let (tx, _) = watch::channel(ShutdownState::Running);
        Self { tx: Arc::new(tx) }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ShutdownState {
        *self.tx.borrow()
    }

    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.tx.subscribe()
    }

    /// `Running → ShuttingDown`. Returns `false` if already past `Running`.
    pub fn begin_shutdown(&self) -> bool {
        self.advance(ShutdownState::ShuttingDown)
    }

    /// `→ Stopped`. Returns `false` if already stopped.
    pub fn mark_stopped(&self) -> bool {
        self.advance(ShutdownState::Stopped)
    }

    fn advance(&self, next: ShutdownState) -> bool {
        let moved = self.tx.send_if_modified(|state| {
            if *state < next {
                *state = next;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::info!(state = %next, "lifecycle transition");
        }
        moved
    }
}
