use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use sync_api::{AppendSuffix, MarkProcessed};
use sync_api_server::AppState;
use sync_engine::{Coordinator, Lifecycle, ShutdownSupervisor, WorkerPool};

use crate::config::ServeArgs;
use crate::error::ServerError;

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("sync-server starting");

    let config = args.engine_config();
    config.validate()?;
    tracing::info!(
        workers = config.workers,
        max_batch_size = config.max_batch_size,
        grace = ?config.grace_period,
        "engine config"
    );

    // --- Tokens: one for the listener, one for the worker pools ---
    let stop_accepting = CancellationToken::new();
    let cancel_work = CancellationToken::new();
    let lifecycle = Lifecycle::new();
    let mut state_rx = lifecycle.subscribe();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow_and_update();
            tracing::info!(%state, "lifecycle state changed");
        }
    });

    // --- Worker pools ---
    let changes = Arc::new(WorkerPool::start(
        Arc::new(MarkProcessed),
        &config,
        cancel_work.clone(),
    ));
    let plain = Arc::new(WorkerPool::start(
        Arc::new(AppendSuffix::default()),
        &config,
        cancel_work.clone(),
    ));

    let state = AppState {
        changes: Coordinator::new(Arc::clone(&changes)),
        plain: Coordinator::new(Arc::clone(&plain)),
        lifecycle: lifecycle.clone(),
    };

    // --- Signals are registered before we start serving ---
    let mut sigterm = signal(SignalKind::terminate())?;
    let termination = async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => tracing::info!("received Ctrl+C"),
                Err(e) => tracing::error!(error = %e, "Ctrl+C handler failed, shutting down"),
            },
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
    };

    // --- API server ---
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let server = tokio::spawn(sync_api_server::run(
        listener,
        state,
        stop_accepting.clone(),
    ));

    tracing::info!(port = args.port, "server ready");

    let supervisor = ShutdownSupervisor::new(
        lifecycle,
        stop_accepting,
        cancel_work,
        config.grace_period,
    );
    supervisor.supervise(termination, server).await?;

    changes.shutdown().await;
    plain.shutdown().await;

    tracing::info!("shutdown complete");
    Ok(())
}
