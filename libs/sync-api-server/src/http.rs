use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use sync_api::{
    Change, ChangeDto, FaultReport, SyncResponse, Transformer, decode_changes, decode_plain,
};
use sync_engine::{Lifecycle, Outcome};

use crate::AppState;
use crate::error::ApiError;

// ═══════════════════════════════════════════════════════════════
//  POST /sync: object records
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_sync<C, P>(
    State(state): State<AppState<C, P>>,
    body: Bytes,
) -> Result<Response, ApiError>
where
    C: Transformer<Item = Change>,
    P: Transformer<Item = String>,
{
    tracing::info!(bytes = body.len(), "received sync request");
    let changes = decode_changes(&body)?;

    let outcomes = state.changes.process(changes).await?;
    let (result, faults) = split_outcomes(outcomes, ChangeDto::from);

    encode(&SyncResponse { result, faults })
}

// ═══════════════════════════════════════════════════════════════
//  POST /sync/plain: string payloads
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_sync_plain<C, P>(
    State(state): State<AppState<C, P>>,
    body: Bytes,
) -> Result<Response, ApiError>
where
    C: Transformer<Item = Change>,
    P: Transformer<Item = String>,
{
    tracing::info!(bytes = body.len(), "received plain sync request");
    let data = decode_plain(&body)?;

    let outcomes = state.plain.process(data).await?;
    let (result, faults) = split_outcomes(outcomes, |s| s);

    encode(&SyncResponse { result, faults })
}

// ═══════════════════════════════════════════════════════════════
//  GET /health
// ═══════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct Health {
    status: &'static str,
    state: &'static str,
}

pub(crate) async fn handle_health<C, P>(State(state): State<AppState<C, P>>) -> Response
where
    C: Transformer<Item = Change>,
    P: Transformer<Item = String>,
{
    let current = state.lifecycle.state();
    let (code, status) = if state.lifecycle.is_accepting() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };
    let body = Health {
        status,
        state: current.as_str(),
    };
    (code, axum::Json(body)).into_response()
}

/// Turns away requests that arrive after shutdown has begun.
pub(crate) async fn reject_when_draining(
    State(lifecycle): State<Lifecycle>,
    request: Request,
    next: Next,
) -> Response {
    if !lifecycle.is_accepting() {
        tracing::warn!(uri = %request.uri(), "rejecting request during shutdown");
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    next.run(request).await
}

fn split_outcomes<I, O>(
    outcomes: Vec<Outcome<I>>,
    render: impl Fn(I) -> O,
) -> (Vec<O>, Vec<FaultReport>) {
    let mut result = Vec::with_capacity(outcomes.len());
    let mut faults = Vec::new();
    for outcome in outcomes {
        match outcome {
            Outcome::Processed(item) => result.push(render(item)),
            Outcome::Fault { key, reason } => faults.push(FaultReport { id: key, reason }),
        }
    }
    (result, faults)
}

fn encode<T: Serialize>(body: &T) -> Result<Response, ApiError> {
    let bytes = serde_json::to_vec(body).map_err(ApiError::Encode)?;
    tracing::debug!(bytes = bytes.len(), "response encoded");
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}
