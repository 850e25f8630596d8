//! Request batches and the transport seam to the remote list store.
//!
//! A caller opens a [`RequestBatch`], queues operations, and hands it to a
//! [`Transport`]. One `flush` is one network round trip. When the server
//! throttles, the transport returns a token for the exact request it sent so
//! the retry resends identical content.

mod http;
mod wire;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attachments::StagedContent;

pub use http::{HttpTransport, PreparedBody};

/// Field name → value for one record.
pub type Fields = BTreeMap<String, serde_json::Value>;

/// Visibility of a record to other clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Moderation {
    Approved,
    Pending,
}

/// One remote mutation. Records are addressed by the client-side staging key.
#[derive(Debug, Clone)]
pub enum Operation {
    CreateRecord {
        key: Uuid,
        list: String,
        folder: Option<String>,
        moderation: Moderation,
    },
    AddAttachment {
        key: Uuid,
        content: StagedContent,
    },
    SetFields {
        key: Uuid,
        fields: Fields,
    },
    Publish {
        key: Uuid,
    },
    DeleteRecord {
        key: Uuid,
        list: String,
    },
}

impl Operation {
    /// Wire name of the operation.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateRecord { .. } => "create_record",
            Operation::AddAttachment { .. } => "add_attachment",
            Operation::SetFields { .. } => "set_fields",
            Operation::Publish { .. } => "publish",
            Operation::DeleteRecord { .. } => "delete_record",
        }
    }
}

/// Ordered set of operations sent in a single round trip.
#[derive(Debug, Clone, Default)]
pub struct RequestBatch {
    operations: Vec<Operation>,
}

impl RequestBatch {
    pub fn open_batch() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, operation: Operation) -> &mut Self {
        self.operations.push(operation);
        self
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Body of an applied batch: one result per queued operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
}

impl Response {
    /// Server-assigned id of the first result, if any.
    pub fn first_id(&self) -> Option<u64> {
        self.results
            .first()
            .and_then(|r| r.get("id"))
            .and_then(|id| id.as_u64())
    }
}

/// Throttling signal: the request was not applied and may be resent with `token`.
#[derive(Debug, Clone)]
pub struct Throttle<K> {
    pub status: u32,
    /// Raw `Retry-After` value, if the server sent one.
    pub retry_after: Option<String>,
    pub token: K,
}

/// Result of one round trip that reached the server.
#[derive(Debug, Clone)]
pub enum FlushOutcome<K> {
    Applied(Response),
    Throttled(Throttle<K>),
}

/// Client for the remote store.
///
/// Implementations must tolerate concurrent use from independent writers.
pub trait Transport: Send + Sync {
    /// Resumable request token. Resending it must send the identical request.
    type Token: Send + Sync;

    /// Send `batch` as one round trip.
    fn flush(
        &self,
        batch: &RequestBatch,
    ) -> impl Future<Output = Result<FlushOutcome<Self::Token>, TransportError>> + Send;

    /// Resend a previously throttled request as one round trip.
    fn resend(
        &self,
        token: &Self::Token,
    ) -> impl Future<Output = Result<FlushOutcome<Self::Token>, TransportError>> + Send;
}

/// Non-throttling failure of a round trip.
#[derive(Debug)]
pub enum TransportError {
    /// Connection, DNS, timeout, or a failed blocking task.
    Network(String),
    /// Server answered with a status that is neither success nor throttling.
    Http { status: u32, body: String },
    /// Batch could not be serialized.
    Encode(serde_json::Error),
    /// Response body could not be parsed.
    Decode(serde_json::Error),
    /// Attachment content could not be read while building the request.
    ContentUnavailable {
        file_name: String,
        source: std::io::Error,
    },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Network(msg) => write!(f, "network: {}", msg),
            TransportError::Http { status, body } => {
                write!(f, "HTTP {}", status)?;
                if !body.is_empty() {
                    write!(f, ": {}", body)?;
                }
                Ok(())
            }
            TransportError::Encode(e) => write!(f, "encode request: {}", e),
            TransportError::Decode(e) => write!(f, "decode response: {}", e),
            TransportError::ContentUnavailable { file_name, source } => {
                write!(f, "attachment {} unreadable: {}", file_name, source)
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Encode(e) | TransportError::Decode(e) => Some(e),
            TransportError::ContentUnavailable { source, .. } => Some(source),
            TransportError::Network(_) | TransportError::Http { .. } => None,
        }
    }
}
