pub mod error;
pub mod record;
pub mod transform;

pub use error::{DecodeError, TransformError};
pub use record::{
    Change, ChangeDto, FaultReport, SyncRequest, SyncResponse, decode_changes, decode_plain,
};
pub use transform::{AppendSuffix, MarkProcessed, Transformer};
