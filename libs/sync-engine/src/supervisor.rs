use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::lifecycle::Lifecycle;

/// Drives `Running → ShuttingDown → Stopped` around a server task.
///
/// `stop_accepting` is what the server watches for graceful shutdown;
/// `cancel_work` is what the worker pool watches. The latter is only
/// cancelled once waiting is over, so in-flight batches can finish.
#[derive(Debug)]
pub struct ShutdownSupervisor {
    lifecycle: Lifecycle,
    stop_accepting: CancellationToken,
    cancel_work: CancellationToken,
    grace: Duration,
}

impl ShutdownSupervisor {
    pub fn new(
        lifecycle: Lifecycle,
        stop_accepting: CancellationToken,
        cancel_work: CancellationToken,
        grace: Duration,
    ) -> Self {
        Self {
            lifecycle,
            stop_accepting,
            cancel_work,
            grace,
        }
    }

    /// Wait for `signal`, then give `server` up to the grace period to drain.
    ///
    /// Returns [`EngineError::ShutdownTimeout`] if the server is still running
    /// when the grace period elapses. Running transforms are not interrupted;
    /// the pool just stops taking new jobs.
    pub async fn supervise<S, E>(
        self,
        signal: S,
        mut server: JoinHandle<Result<(), E>>,
    ) -> Result<(), EngineError>
    where
        S: Future<Output = ()>,
        E: Display,
    {
        tokio::select! {
            _ = signal => {}
            res = &mut server => {
                tracing::error!("server exited before a termination signal");
                self.cancel_work.cancel();
                self.lifecycle.mark_stopped();
                return server_result(res);
            }
        }

        tracing::info!(grace = ?self.grace, "termination requested, draining in-flight requests");
        self.lifecycle.begin_shutdown();
        self.stop_accepting.cancel();

        let drained = tokio::time::timeout(self.grace, &mut server).await;

        self.cancel_work.cancel();
        self.lifecycle.mark_stopped();

        match drained {
            Ok(res) => {
                server_result(res)?;
                tracing::info!("server drained");
                Ok(())
            }
            Err(_) => {
                server.abort();
                Err(EngineError::ShutdownTimeout { grace: self.grace })
            }
        }
    }
}

fn server_result<E: Display>(res: Result<Result<(), E>, JoinError>) -> Result<(), EngineError> {
    match res {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(EngineError::Server(e.to_string())),
        Err(e) => Err(EngineError::Server(e.to_string())),
    }
}
