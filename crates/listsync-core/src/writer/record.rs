//! The staged, not-yet-visible record and the batches built from it.

use chrono::NaiveDateTime;
use serde_json::Value;
use uuid::Uuid;

use crate::attachments::StagedContent;
use crate::transport::{Fields, Moderation, Operation, RequestBatch};

/// Field that receives the current time when supplied as an empty string.
pub const CREATED_FIELD: &str = "Created";
/// Field used to identify a record in logs and errors.
pub const TITLE_FIELD: &str = "Title";
/// `yyyy/MM/dd HH:mm:ss`
pub const CREATED_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Uncommitted composite write owned by one `create` call.
#[derive(Debug)]
pub(crate) struct PendingRecord {
    pub(crate) key: Uuid,
    pub(crate) list: String,
    pub(crate) folder: Option<String>,
    pub(crate) moderation: Moderation,
    pub(crate) attachments: Vec<StagedContent>,
    pub(crate) fields: Fields,
}

impl PendingRecord {
    /// Stage a record with visibility suppressed.
    pub(crate) fn stage(list: &str, folder: Option<String>) -> Self {
        Self {
            key: Uuid::new_v4(),
            list: list.to_string(),
            folder,
            moderation: Moderation::Pending,
            attachments: Vec::new(),
            fields: Fields::new(),
        }
    }

    /// Create, attachments, fields, publish. Attachments go before field
    /// values so "modified by" is not attributed to the service account.
    pub(crate) fn commit_batch(&self) -> RequestBatch {
        let mut batch = RequestBatch::open_batch();
        batch.queue(Operation::CreateRecord {
            key: self.key,
            list: self.list.clone(),
            folder: self.folder.clone(),
            moderation: self.moderation,
        });
        for content in &self.attachments {
            batch.queue(Operation::AddAttachment {
                key: self.key,
                content: content.clone(),
            });
        }
        batch
            .queue(Operation::SetFields {
                key: self.key,
                fields: self.fields.clone(),
            })
            .queue(Operation::Publish { key: self.key });
        batch
    }

    pub(crate) fn delete_batch(&self) -> RequestBatch {
        let mut batch = RequestBatch::open_batch();
        batch.queue(Operation::DeleteRecord {
            key: self.key,
            list: self.list.clone(),
        });
        batch
    }
}

/// Copy `fields`, replacing an empty `Created` with `now`.
pub(crate) fn apply_fields(fields: &Fields, now: NaiveDateTime) -> Fields {
    let mut applied = fields.clone();
    if let Some(created) = applied.get_mut(CREATED_FIELD) {
        if created.as_str() == Some("") {
            *created = Value::String(now.format(CREATED_FORMAT).to_string());
        }
    }
    applied
}

/// `Title` as text, for logs and error context.
pub(crate) fn title_of(fields: &Fields) -> Option<String> {
    fields.get(TITLE_FIELD).map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
