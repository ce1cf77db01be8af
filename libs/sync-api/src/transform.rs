use serde_json::Value;

use crate::error::TransformError;
use crate::record::Change;

/// Field written by [`MarkProcessed`].
pub const STATUS_FIELD: &str = "status";
/// Value written by [`MarkProcessed`].
pub const STATUS_PROCESSED: &str = "processed";

/// Per-item transformation applied by the coordinator.
///
/// Implementations are called concurrently from several workers and must not
/// share mutable state between calls. Each call owns its item.
pub trait Transformer: Send + Sync + 'static {
    type Item: Send + 'static;

    /// Short name used in logs and fault messages.
    fn name(&self) -> &'static str;

    /// Identifier reported when this item faults.
    fn key(&self, item: &Self::Item) -> String;

    fn transform(&self, item: Self::Item) -> Result<Self::Item, TransformError>;
}

/// Sets `data.status = "processed"`, overwriting any previous value.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkProcessed;

impl Transformer for MarkProcessed {
    type Item = Change;

    fn name(&self) -> &'static str {
        "mark-processed"
    }

    fn key(&self, item: &Change) -> String {
        item.id.clone()
    }

    fn transform(&self, mut item: Change) -> Result<Change, TransformError> {
        item.data
            .insert(STATUS_FIELD.to_string(), Value::from(STATUS_PROCESSED));
        tracing::info!(id = %item.id, kind = %item.kind, "processed change");
        Ok(item)
    }
}

/// Appends a fixed suffix to a plain string payload.
#[derive(Debug, Clone)]
pub struct AppendSuffix {
    suffix: String,
}

impl AppendSuffix {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }
}

impl Default for AppendSuffix {
    fn default() -> Self {
        Self::new("_processed")
    }
}

impl Transformer for AppendSuffix {
    type Item = String;

    fn name(&self) -> &'static str {
        "append-suffix"
    }

    fn key(&self, item: &String) -> String {
        item.clone()
    }

    fn transform(&self, mut item: String) -> Result<String, TransformError> {
        item.push_str(&self.suffix);
        tracing::info!(data = %item, "processed data");
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ChangeDto;
    use serde_json::json;

    fn change(data: Value) -> Change {
        let dto = ChangeDto {
            kind: "create".into(),
            data: data.as_object().unwrap().clone(),
        };
        Change::from_dto(dto, 0).unwrap()
    }

    #[test]
    fn mark_processed_adds_status() {
        let out = MarkProcessed
            .transform(change(json!({"_id": "1", "name": "x"})))
            .unwrap();
        assert_eq!(
            Value::Object(out.data),
            json!({"_id": "1", "name": "x", "status": "processed"})
        );
    }

    #[test]
    fn mark_processed_overwrites_existing_status() {
        let out = MarkProcessed
            .transform(change(json!({"_id": "1", "status": "pending"})))
            .unwrap();
        assert_eq!(out.data[STATUS_FIELD], STATUS_PROCESSED);
    }

    #[test]
    fn append_suffix_default_and_custom() {
        assert_eq!(AppendSuffix::default().transform("a".into()).unwrap(), "a_processed");
        assert_eq!(AppendSuffix::new("!").transform("b".into()).unwrap(), "b!");
    }
}
