mod error;
mod http;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use sync_api::{AppendSuffix, Change, MarkProcessed, Transformer};
use sync_engine::{Coordinator, Lifecycle};

pub use error::ApiError;

/// Everything the handlers need. Built once at startup and injected into the router.
pub struct AppState<C = MarkProcessed, P = AppendSuffix>
where
    C: Transformer<Item = Change>,
    P: Transformer<Item = String>,
{
    /// Coordinator behind `POST /sync`.
    pub changes: Coordinator<C>,
    /// Coordinator behind `POST /sync/plain`.
    pub plain: Coordinator<P>,
    pub lifecycle: Lifecycle,
}

impl<C, P> Clone for AppState<C, P>
where
    C: Transformer<Item = Change>,
    P: Transformer<Item = String>,
{
    fn clone(&self) -> Self {
        Self {
            changes: self.changes.clone(),
            plain: self.plain.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

/// Build the router. Each call yields an independent instance.
pub fn router<C, P>(state: AppState<C, P>) -> Router
where
    C: Transformer<Item = Change>,
    P: Transformer<Item = String>,
{
    Router::new()
        .route("/sync", post(http::handle_sync::<C, P>))
        .route("/sync/plain", post(http::handle_sync_plain::<C, P>))
        .route_layer(middleware::from_fn_with_state(
            state.lifecycle.clone(),
            http::reject_when_draining,
        ))
        .route("/health", get(http::handle_health::<C, P>))
        .with_state(state)
}

/// Serve on `listener` until `shutdown` is cancelled, then drain open connections.
///
/// New connections are refused as soon as `shutdown` fires; the returned
/// future resolves once every in-flight request has been answered.
pub async fn run<C, P>(
    listener: TcpListener,
    state: AppState<C, P>,
    shutdown: CancellationToken,
) -> std::io::Result<()>
where
    C: Transformer<Item = Change>,
    P: Transformer<Item = String>,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "api server listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("api server stopped");
    Ok(())
}
