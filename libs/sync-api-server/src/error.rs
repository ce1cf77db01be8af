use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use sync_api::DecodeError;
use sync_engine::EngineError;

/// Request-scoped failure. Never affects other requests or process state.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("failed to encode response: {0}")]
    Encode(serde_json::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Decode(_) => StatusCode::BAD_REQUEST,
            ApiError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Engine(EngineError::BatchTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Engine(EngineError::PoolClosed) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, self.to_string()).into_response()
    }
}
