//! JSON encoding of request batches and decoding of batch responses.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use uuid::Uuid;

use super::{Fields, Moderation, Operation, RequestBatch, Response, TransportError};

#[derive(Serialize)]
struct WireBatch<'a> {
    operations: Vec<WireOperation<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum WireOperation<'a> {
    CreateRecord {
        key: Uuid,
        list: &'a str,
        folder: Option<&'a str>,
        moderation: Moderation,
    },
    AddAttachment {
        key: Uuid,
        file_name: &'a str,
        content_base64: String,
    },
    SetFields {
        key: Uuid,
        fields: &'a Fields,
    },
    Publish {
        key: Uuid,
    },
    DeleteRecord {
        key: Uuid,
        list: &'a str,
    },
}

/// Serialize `batch`, reading attachment content from its open handles.
///
/// Encoding the same batch again yields the same bytes as long as the staged
/// content is unchanged.
pub(crate) fn encode_batch(batch: &RequestBatch) -> Result<Vec<u8>, TransportError> {
    let mut operations = Vec::with_capacity(batch.len());
    for op in batch.operations() {
        let wire = match op {
            Operation::CreateRecord {
                key,
                list,
                folder,
                moderation,
            } => WireOperation::CreateRecord {
                key: *key,
                list,
                folder: folder.as_deref(),
                moderation: *moderation,
            },
            Operation::AddAttachment { key, content } => {
                let bytes =
                    content
                        .read_all()
                        .map_err(|source| TransportError::ContentUnavailable {
                            file_name: content.file_name().to_string(),
                            source,
                        })?;
                WireOperation::AddAttachment {
                    key: *key,
                    file_name: content.file_name(),
                    content_base64: STANDARD.encode(bytes),
                }
            }
            Operation::SetFields { key, fields } => WireOperation::SetFields { key: *key, fields },
            Operation::Publish { key } => WireOperation::Publish { key: *key },
            Operation::DeleteRecord { key, list } => WireOperation::DeleteRecord { key: *key, list },
        };
        operations.push(wire);
    }
    serde_json::to_vec(&WireBatch { operations }).map_err(TransportError::Encode)
}

/// Parse a success body. An empty body means no per-operation results.
pub(crate) fn decode_response(body: &[u8]) -> Result<Response, TransportError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Response::default());
    }
    serde_json::from_slice(body).map_err(TransportError::Decode)
}
