/// Input batch could not be turned into records. Maps to a client error.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed request body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("item {index}: data._id is missing or not usable as an identifier")]
    MissingId { index: usize },
}

/// A single item's transform failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{transformer}: {message}")]
pub struct TransformError {
    pub transformer: &'static str,
    pub message: String,
}

impl TransformError {
    pub fn new(transformer: &'static str, message: impl Into<String>) -> Self {
        Self {
            transformer,
            message: message.into(),
        }
    }
}
