use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Field inside `data` that carries the record identifier.
pub const ID_FIELD: &str = "_id";

/// Wire form of one change, exactly as clients send and receive it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeDto {
    /// Empty when the client omits it.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Internal form of a change. Lives only for the duration of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub id: String,
    /// Open tag such as `create` / `update` / `delete`.
    pub kind: String,
    pub data: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
}

impl Change {
    /// Convert a wire record, stamping `updated_at` with the current time.
    ///
    /// `index` is the item's position in the batch and only feeds the error.
    pub fn from_dto(dto: ChangeDto, index: usize) -> Result<Self, DecodeError> {
        let id = dto
            .data
            .get(ID_FIELD)
            .and_then(id_from_value)
            .ok_or(DecodeError::MissingId { index })?;
        Ok(Self {
            id,
            kind: dto.kind,
            data: dto.data,
            updated_at: Utc::now(),
        })
    }
}

impl From<Change> for ChangeDto {
    fn from(change: Change) -> Self {
        Self {
            kind: change.kind,
            data: change.data,
        }
    }
}

/// Strings are taken verbatim, integers by their decimal form.
fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// `{"data": [...]}` request envelope.
///
/// An absent or `null` `data` reads as an empty batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct SyncRequest<T> {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<T>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// `{"result": [...]}` response envelope.
///
/// `faults` is omitted when empty so fault-free responses keep the plain shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse<T> {
    pub result: Vec<T>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<FaultReport>,
}

/// One item that could not be transformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultReport {
    pub id: String,
    pub reason: String,
}

/// Parse an object-variant request body into internal records.
///
/// The whole batch is rejected if any item lacks a usable identifier.
pub fn decode_changes(body: &[u8]) -> Result<Vec<Change>, DecodeError> {
    let req: SyncRequest<ChangeDto> = serde_json::from_slice(body)?;
    req.data
        .into_iter()
        .enumerate()
        .map(|(index, dto)| Change::from_dto(dto, index))
        .collect()
}

/// Parse a plain-string request body.
pub fn decode_plain(body: &[u8]) -> Result<Vec<String>, DecodeError> {
    let req: SyncRequest<String> = serde_json::from_slice(body)?;
    Ok(req.data)
}
